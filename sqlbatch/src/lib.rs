#![forbid(unsafe_code)]
//! Facade crate for the `sqlbatch` bulk-write library.
//!
//! Re-exports the core types, the `Batchable` derive and the SQL builder, and hosts
//! the batch engine: records are split into chunks that fit the database's parameter
//! limit, each chunk becomes one multi-row INSERT or one MERGE against a VALUES
//! source, and all chunks of a call run inside a single transaction.
//!
//! # Example: upserting records
//!
//! ```ignore
//! use sqlbatch::{batch_upsert, record, KeySpec};
//!
//! let rows = vec![
//!     record! { "userId" => 1i64, "settingKey" => "theme", "value" => "dark" },
//!     record! { "userId" => 1i64, "settingKey" => "lang", "value" => "en" },
//! ];
//! let keys = KeySpec::composite(["userId", "settingKey"])?;
//! let result = batch_upsert(&executor, "user_settings", &rows, &keys).await?;
//! assert_eq!(result.total_records, 2);
//! ```
//!
//! # Example: typed records
//!
//! ```ignore
//! use sqlbatch::{batch_upsert_entities, Batchable};
//!
//! #[derive(Batchable, Clone)]
//! #[batch(table = "user_settings")]
//! struct Setting {
//!     #[batch(key, column = "userId")]
//!     user_id: i64,
//!     #[batch(key, column = "settingKey")]
//!     key: String,
//!     value: String,
//! }
//!
//! batch_upsert_entities(&executor, &settings).await?;
//! ```
//!
//! If `executor` is already bound to a transaction the batch joins it; otherwise
//! the batch opens, commits or rolls back its own.

pub mod engine;
pub mod pagination;
mod sizing;
mod validate;

// Re-export all core types.
pub use sqlbatch_core::{
    classify_sqlstate, record, BatchOperation, BatchResult, Batchable, DbError, DbErrorKind,
    DbResult, Dialect, IntoRecord, KeySpec, Record, SqlValue, Statement, RECORD_SNAPSHOT_LIMIT,
};

// Re-export the derive macro. Trait and derive share the name in different namespaces.
pub use sqlbatch_macros::Batchable;

pub use sqlbatch_sql_builder as sql_builder;

// Re-export backend-agnostic transactions API so end-users can import from the facade.
pub use sqlbatch_core::transactions;
pub use sqlbatch_core::transactions::{
    in_transaction, Executor, Isolation, Transaction, TransactionDefinition,
};

pub use engine::{
    batch_insert, batch_insert_entities, batch_update, batch_update_entities, batch_upsert,
    batch_upsert_entities, BatchConfig, BatchEngine, PARAMETER_LIMIT_ENV,
};
pub use pagination::{Page, PageMeta, PageRequest, MAX_PAGE_SIZE};
pub use sizing::{compute_chunk_size, DEFAULT_PARAMETER_LIMIT};
pub use validate::validate_keys;

// Backend executors re-exported under a neutral namespace, so end-users don't
// have to depend on backend crates directly. These are feature-gated.
pub mod backends {
    #[cfg(feature = "postgres-backend")]
    pub use sqlbatch_tokio_postgres::{PostgresExecutor, PostgresTransaction};
}
