use sqlbatch_macros::Batchable;

#[derive(Batchable)]
struct Broken {
    #[batch(key, skip)]
    id: i64,
    name: String,
}

fn main() {}
