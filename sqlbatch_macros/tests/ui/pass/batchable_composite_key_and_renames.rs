use sqlbatch_core::{Batchable, IntoRecord, SqlValue};
use sqlbatch_macros::Batchable;

#[derive(Batchable)]
#[batch(table = "app.user_settings")]
struct Setting {
    #[batch(key, column = "userId")]
    user_id: i64,
    #[batch(key, column = "settingKey")]
    key: String,
    value: String,
    updated_at: chrono::NaiveDateTime,
    #[batch(skip)]
    cached: bool,
}

fn main() {
    assert_eq!(Setting::TABLE, "app.user_settings");
    assert_eq!(
        Setting::COLUMNS,
        &["userId", "settingKey", "value", "updated_at"]
    );
    let keys = Setting::key_spec().unwrap();
    assert_eq!(keys.columns(), &["userId".to_string(), "settingKey".to_string()]);

    let s = Setting {
        user_id: 1,
        key: "theme".into(),
        value: "dark".into(),
        updated_at: chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap(),
        cached: true,
    };
    let r = s.to_record();
    assert_eq!(r.len(), 4);
    assert!(!r.contains_column("cached"));
    assert_eq!(r.get("settingKey"), Some(&SqlValue::String("theme".into())));
    let _ = s.cached;
}
