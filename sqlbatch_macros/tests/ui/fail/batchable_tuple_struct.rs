use sqlbatch_macros::Batchable;

#[derive(Batchable)]
struct Broken(i64, String);

fn main() {}
