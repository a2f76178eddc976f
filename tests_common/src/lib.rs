//! Common integration testing utilities and generic scenarios reusable across backends.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sqlbatch::{batch_insert, batch_upsert, Batchable};
use sqlbatch_core::transactions::{Executor, Transaction, TransactionDefinition};
use sqlbatch_core::{BatchResult, DbError, DbResult, Dialect, KeySpec, Record, Statement};

#[derive(Batchable, Clone, Debug, PartialEq)]
#[batch(table = "users")] // consistent across backends
pub struct User {
    #[batch(key)]
    pub id: i64,
    pub name: String,
}

#[derive(Batchable, Clone, Debug, PartialEq)]
#[batch(table = "user_settings")]
pub struct UserSetting {
    #[batch(key, column = "userId")]
    pub user_id: i64,
    #[batch(key, column = "settingKey")]
    pub setting_key: String,
    pub value: Option<String>,
}

/// Expose migration SQL via constants for harnesses.
pub mod migrations {
    pub const POSTGRES_USERS_SQL: &str = include_str!("../migrations/postgres/001_users.sql");
    pub const POSTGRES_USER_SETTINGS_SQL: &str =
        include_str!("../migrations/postgres/002_user_settings.sql");

    /// All Postgres migrations in apply order.
    pub const POSTGRES_ALL: &[&str] = &[POSTGRES_USERS_SQL, POSTGRES_USER_SETTINGS_SQL];
}

/// `n` two-column user records with ids `1..=n`.
pub fn user_records(n: usize) -> Vec<Record> {
    (1..=n as i64)
        .map(|id| {
            Record::new()
                .with("id", id)
                .with("name", format!("user-{}", id))
        })
        .collect()
}

/// One setting record for `user_id`.
pub fn setting(user_id: i64, key: &str, value: &str) -> Record {
    Record::new()
        .with("userId", user_id)
        .with("settingKey", key)
        .with("value", value)
}

/// Something that happened on a [`MemoryExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin(TransactionDefinition),
    Execute(Statement),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct MemState {
    events: Vec<Event>,
    executed: usize,
    fail_at: Option<(usize, Option<String>)>,
    pending: Vec<Statement>,
    committed: Vec<Statement>,
}

/// In-memory executor that records every call instead of talking to a database.
///
/// Statements run inside a transaction stay pending until commit; a rollback drops
/// them. Statements run outside any transaction count as committed immediately.
#[derive(Debug, Clone)]
pub struct MemoryExecutor {
    state: Arc<Mutex<MemState>>,
    dialect: Dialect,
    in_tx: bool,
}

impl MemoryExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState::default())),
            dialect,
            in_tx: false,
        }
    }

    /// Make the `n`th executed statement (1-based, counted across all handles) fail
    /// with a backend error carrying `code`.
    pub fn fail_on_statement(self, n: usize, code: Option<&str>) -> Self {
        self.lock().fail_at = Some((n, code.map(str::to_string)));
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Every statement passed to `execute`, including failed ones.
    pub fn statements(&self) -> Vec<Statement> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statements whose effects survived.
    pub fn committed(&self) -> Vec<Statement> {
        self.lock().committed.clone()
    }

    pub fn begin_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Begin(_)))
            .count()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.lock().events.iter().filter(|e| *e == wanted).count()
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn is_in_transaction(&self) -> bool {
        self.in_tx
    }

    async fn execute(&self, statement: &Statement) -> DbResult<u64> {
        let mut st = self.lock();
        st.events.push(Event::Execute(statement.clone()));
        st.executed += 1;
        if let Some((n, code)) = &st.fail_at {
            if *n == st.executed {
                return Err(DbError::backend_with_code(
                    code.clone(),
                    std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
                ));
            }
        }
        if self.in_tx {
            st.pending.push(statement.clone());
        } else {
            st.committed.push(statement.clone());
        }
        Ok(1)
    }

    async fn begin(&self, def: &TransactionDefinition) -> DbResult<Box<dyn Transaction>> {
        if self.in_tx {
            return Err(DbError::NestedTransaction);
        }
        self.lock().events.push(Event::Begin(def.clone()));
        Ok(Box::new(MemoryExecutor {
            state: self.state.clone(),
            dialect: self.dialect,
            in_tx: true,
        }))
    }
}

#[async_trait]
impl Transaction for MemoryExecutor {
    fn as_executor(&self) -> &dyn Executor {
        self
    }

    async fn commit(&mut self) -> DbResult<()> {
        let mut st = self.lock();
        st.events.push(Event::Commit);
        let pending = std::mem::take(&mut st.pending);
        st.committed.extend(pending);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        let mut st = self.lock();
        st.events.push(Event::Rollback);
        st.pending.clear();
        Ok(())
    }
}

/// 1500 two-column records under the default limit: chunks of 1000 and 500.
pub async fn test_bulk_insert_two_chunks(exec: &dyn Executor) -> DbResult<BatchResult> {
    let records = user_records(1500);
    let result = batch_insert(exec, User::TABLE, &records).await?;
    assert_eq!(
        result,
        BatchResult {
            total_records: 1500,
            batch_count: 2
        }
    );
    Ok(result)
}

/// Upsert of one existing and one new composite key in a single statement.
/// The harness is expected to have stored `(1, "theme")` beforehand.
pub async fn test_upsert_matched_and_unmatched(exec: &dyn Executor) -> DbResult<BatchResult> {
    let records = vec![setting(1, "theme", "dark"), setting(1, "lang", "en")];
    let keys = UserSetting::key_spec()?;
    let result = batch_upsert(exec, UserSetting::TABLE, &records, &keys).await?;
    assert_eq!(result.batch_count, 1);
    assert_eq!(result.total_records, 2);
    Ok(result)
}

/// A record missing part of a composite key aborts the call.
pub async fn test_missing_composite_key_part(exec: &dyn Executor) -> DbResult<()> {
    let records = vec![
        setting(1, "theme", "dark"),
        Record::new().with("userId", 2i64).with("value", "x"),
    ];
    let keys = KeySpec::composite(["userId", "settingKey"])?;
    match batch_upsert(exec, UserSetting::TABLE, &records, &keys).await {
        Err(DbError::KeyMissing { key, index, .. }) => {
            assert_eq!(key, "settingKey");
            assert_eq!(index, 1);
            Ok(())
        }
        other => panic!("expected KeyMissing, got {other:?}"),
    }
}
