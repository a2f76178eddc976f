use sqlbatch_core::{Batchable, IntoRecord, SqlValue};
use sqlbatch_macros::Batchable;

#[derive(Batchable)]
struct UserProfile {
    #[batch(key)]
    id: i64,
    name: String,
    nickname: Option<String>,
}

fn main() {
    assert_eq!(UserProfile::TABLE, "user_profiles");
    assert_eq!(UserProfile::COLUMNS, &["id", "name", "nickname"]);
    assert_eq!(UserProfile::KEY_COLUMNS, &["id"]);

    let p = UserProfile {
        id: 7,
        name: "ann".to_string(),
        nickname: None,
    };
    let r = p.to_record();
    assert_eq!(r.get("id"), Some(&SqlValue::I64(7)));
    assert_eq!(r.get("nickname"), Some(&SqlValue::Null));
    assert!(!UserProfile::key_spec().unwrap().is_composite());
}
