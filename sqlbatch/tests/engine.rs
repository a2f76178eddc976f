use std::time::Duration;

use sqlbatch::{
    batch_insert, batch_update, batch_update_entities, batch_upsert, batch_upsert_entities,
    in_transaction, BatchConfig, BatchEngine, BatchOperation, BatchResult, Batchable, DbError,
    DbErrorKind, Dialect, Executor, Isolation, KeySpec, Record, SqlValue, Transaction, TransactionDefinition,
};
use tests_common::{
    setting, test_bulk_insert_two_chunks, test_missing_composite_key_part,
    test_upsert_matched_and_unmatched, user_records, Event, MemoryExecutor, UserSetting,
};

fn exec() -> MemoryExecutor {
    MemoryExecutor::new(Dialect::Generic)
}

#[tokio::test]
async fn scenario_a_two_chunks_in_one_transaction() {
    let exec = exec();
    test_bulk_insert_two_chunks(&exec).await.unwrap();

    let stmts = exec.statements();
    assert_eq!(stmts.len(), 2);
    assert_eq!(stmts[0].params.len(), 2000);
    assert_eq!(stmts[1].params.len(), 1000);
    assert!(stmts[0].sql.starts_with("INSERT INTO \"users\" (\"id\", \"name\") VALUES"));

    let events = exec.events();
    assert!(matches!(events.first(), Some(Event::Begin(_))));
    assert_eq!(events.last(), Some(&Event::Commit));
    assert_eq!(exec.begin_count(), 1);
    assert_eq!(exec.committed().len(), 2);
}

#[tokio::test]
async fn chunk_count_for_2500_narrow_records() {
    let exec = exec();
    let result = batch_insert(&exec, "users", &user_records(2500)).await.unwrap();
    assert_eq!(
        result,
        BatchResult {
            total_records: 2500,
            batch_count: 3
        }
    );
    let sizes: Vec<usize> = exec.statements().iter().map(|s| s.params.len() / 2).collect();
    assert_eq!(sizes, vec![1000, 1000, 500]);
}

#[tokio::test]
async fn empty_input_is_a_no_op_for_every_operation() {
    let exec = exec();
    let keys = KeySpec::single("id");
    assert_eq!(
        batch_insert(&exec, "users", &[]).await.unwrap(),
        BatchResult::default()
    );
    assert_eq!(
        batch_update(&exec, "users", &[], &keys).await.unwrap(),
        BatchResult::default()
    );
    assert_eq!(
        batch_upsert(&exec, "users", &[], &keys).await.unwrap(),
        BatchResult::default()
    );
    assert!(exec.events().is_empty());
}

#[tokio::test]
async fn missing_key_fails_fast_with_absolute_index() {
    let exec = exec();
    let mut records = user_records(10);
    records[7] = Record::new().with("name", "no id");
    // Two columns under a limit of 6: chunks of three records.
    let engine = BatchEngine::new(BatchConfig::default().with_parameter_limit(6));

    let err = engine
        .update(&exec, "users", &records, &KeySpec::single("id"))
        .await
        .unwrap_err();
    match err {
        DbError::KeyMissing {
            key,
            index,
            operation,
            ..
        } => {
            assert_eq!(key, "id");
            assert_eq!(index, 7);
            assert_eq!(operation, BatchOperation::Update);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Chunks [0..3) and [3..6) ran; the chunk holding index 7 never did.
    assert_eq!(exec.statements().len(), 2);
    assert_eq!(exec.count(&Event::Rollback), 1);
    assert_eq!(exec.count(&Event::Commit), 0);
    assert!(exec.committed().is_empty());
}

#[tokio::test]
async fn scenario_b_composite_key_part_missing() {
    let exec = exec();
    test_missing_composite_key_part(&exec).await.unwrap();
    assert!(exec.statements().is_empty());

    let records = vec![Record::new().with("userId", 5i64).with("value", "v")];
    let err = batch_update(
        &exec,
        "user_settings",
        &records,
        &KeySpec::composite(["userId", "settingKey"]).unwrap(),
    )
    .await
    .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("settingKey"), "{msg}");
    assert!(msg.contains("index 0"), "{msg}");
    assert!(msg.contains("{userId: 5, value: \"v\"}"), "{msg}");
    assert_eq!(err.kind(), DbErrorKind::Validation);
}

#[tokio::test]
async fn scenario_c_upsert_is_one_merge_statement() {
    let exec = exec();
    test_upsert_matched_and_unmatched(&exec).await.unwrap();

    let stmts = exec.statements();
    assert_eq!(stmts.len(), 1);
    assert_eq!(
        stmts[0].sql,
        "MERGE INTO \"user_settings\" AS \"target\" \
         USING (VALUES (?, ?, ?), (?, ?, ?)) AS \"source\" (\"userId\", \"settingKey\", \"value\") \
         ON \"source\".\"userId\" = \"target\".\"userId\" AND \"source\".\"settingKey\" = \"target\".\"settingKey\" \
         WHEN MATCHED THEN UPDATE SET \"value\" = \"source\".\"value\" \
         WHEN NOT MATCHED THEN INSERT (\"userId\", \"settingKey\", \"value\") \
         VALUES (\"source\".\"userId\", \"source\".\"settingKey\", \"source\".\"value\")"
    );
    assert_eq!(stmts[0].params[1], SqlValue::String("theme".into()));
}

#[tokio::test]
async fn bound_executor_is_reused_without_nesting() {
    let exec = exec();
    let mut tx = exec.begin(&TransactionDefinition::default()).await.unwrap();
    let result = batch_insert(tx.as_executor(), "users", &user_records(2500))
        .await
        .unwrap();
    assert_eq!(result.batch_count, 3);
    assert_eq!(exec.begin_count(), 1);
    // The caller owns the transaction: nothing is committed until it says so.
    assert_eq!(exec.count(&Event::Commit), 0);
    assert!(exec.committed().is_empty());
    tx.commit().await.unwrap();
    assert_eq!(exec.committed().len(), 3);
}

#[tokio::test]
async fn bound_executor_errors_are_left_to_the_caller() {
    let exec = exec().fail_on_statement(2, Some("23505"));
    let mut tx = exec.begin(&TransactionDefinition::default()).await.unwrap();
    let err = batch_insert(tx.as_executor(), "users", &user_records(2500))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DbErrorKind::UniqueViolation);
    assert_eq!(exec.count(&Event::Rollback), 0);
    tx.rollback().await.unwrap();
    assert!(exec.committed().is_empty());
}

#[tokio::test]
async fn later_chunk_failure_rolls_everything_back() {
    let exec = exec().fail_on_statement(3, Some("23503"));
    let err = batch_upsert(&exec, "users", &user_records(3500), &KeySpec::single("id"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DbErrorKind::ForeignKeyViolation);
    match &err {
        DbError::Backend { code, source } => {
            assert_eq!(code.as_deref(), Some("23503"));
            assert_eq!(source.to_string(), "injected failure");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(exec.statements().len(), 3);
    assert_eq!(exec.events().last(), Some(&Event::Rollback));
    assert!(exec.committed().is_empty());
}

#[tokio::test]
async fn shape_and_identifier_errors_precede_the_transaction() {
    let exec = exec();
    let records = vec![Record::new().with("id", 1i64), Record::new()];
    let err = batch_insert(&exec, "users", &records).await.unwrap_err();
    assert!(matches!(err, DbError::Shape { index: 1 }));

    let err = batch_insert(&exec, "", &user_records(1)).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidIdentifier { .. }));
    assert!(exec.events().is_empty());
}

#[tokio::test]
async fn update_only_with_key_columns_only_is_rejected() {
    let exec = exec();
    let records = vec![Record::new().with("id", 1i64)];
    let err = batch_update(&exec, "users", &records, &KeySpec::single("id"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NoUpdatableColumns { .. }));
    assert_eq!(exec.count(&Event::Rollback), 1);
}

#[tokio::test]
async fn typed_helpers_use_derived_metadata() {
    let exec = MemoryExecutor::new(Dialect::Postgres);
    let settings = vec![
        UserSetting {
            user_id: 1,
            setting_key: "theme".into(),
            value: Some("dark".into()),
        },
        UserSetting {
            user_id: 2,
            setting_key: "theme".into(),
            value: None,
        },
    ];
    batch_upsert_entities(&exec, &settings).await.unwrap();
    batch_update_entities(&exec, &settings).await.unwrap();

    let stmts = exec.statements();
    assert_eq!(stmts.len(), 2);
    assert!(stmts[0]
        .sql
        .contains("(VALUES ($1::int8, $2, $3), ($4::int8, $5, $6))"));
    assert!(stmts[0].sql.contains("WHEN NOT MATCHED"));
    assert!(!stmts[1].sql.contains("WHEN NOT MATCHED"));
    assert_eq!(stmts[1].params[5], SqlValue::Null);
    assert_eq!(exec.begin_count(), 2);
}

#[derive(Batchable, Clone, Debug)]
#[batch(table = "counters")]
struct Counter {
    #[batch(key)]
    id: i64,
    hits: Option<i64>,
    ratio: Option<f64>,
}

#[tokio::test]
async fn postgres_update_of_all_null_column_binds_no_untyped_parameter() {
    let exec = MemoryExecutor::new(Dialect::Postgres);
    let counters = vec![
        Counter {
            id: 1,
            hits: None,
            ratio: Some(0.5),
        },
        Counter {
            id: i64::from(i32::MAX) + 1,
            hits: None,
            ratio: None,
        },
    ];
    let result = batch_update_entities(&exec, &counters).await.unwrap();
    assert_eq!(result.batch_count, 1);

    let st = &exec.statements()[0];
    assert_eq!(
        st.sql,
        "MERGE INTO \"counters\" AS \"target\" \
         USING (VALUES ($1::int8, $2::float8), ($3::int8, $4::float8)) AS \"source\" (\"id\", \"ratio\") \
         ON \"source\".\"id\" = \"target\".\"id\" \
         WHEN MATCHED THEN UPDATE SET \"hits\" = NULL, \"ratio\" = \"source\".\"ratio\""
    );
    assert_eq!(st.params.len(), 4);
    assert_eq!(st.params[3], SqlValue::Null);
}

#[tokio::test]
async fn engine_passes_transaction_definition_to_begin() {
    let exec = exec();
    let def = TransactionDefinition {
        isolation: Isolation::Serializable,
        read_only: false,
        timeout: Some(Duration::from_secs(5)),
    };
    let engine = BatchEngine::new(BatchConfig::default().with_transaction(def.clone()));
    engine
        .insert(&exec, "users", &user_records(3))
        .await
        .unwrap();
    assert_eq!(exec.events()[0], Event::Begin(def));
}

#[tokio::test]
async fn composed_calls_share_one_transaction() {
    let exec = exec();
    let users = user_records(5);
    let settings = vec![setting(1, "theme", "dark")];
    let total = in_transaction(&exec, &TransactionDefinition::default(), move |tx| {
        Box::pin(async move {
            let a = batch_insert(tx, "users", &users).await?;
            let keys = KeySpec::composite(["userId", "settingKey"])?;
            let b = batch_upsert(tx, "user_settings", &settings, &keys).await?;
            Ok(a.total_records + b.total_records)
        })
    })
    .await
    .unwrap();
    assert_eq!(total, 6);
    assert_eq!(exec.begin_count(), 1);
    assert_eq!(exec.count(&Event::Commit), 1);
    assert_eq!(exec.committed().len(), 2);
}
