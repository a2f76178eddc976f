use sqlbatch_macros::Batchable;

#[derive(Batchable)]
struct Broken {
    #[batch(primary)]
    id: i64,
}

fn main() {}
