#![forbid(unsafe_code)]
//! Core types for the sqlbatch bulk-write layer.
//! This crate is database-agnostic and should not contain any backend-specific logic.

// Re-export for downstream backend implementations of the executor traits.
pub use async_trait::async_trait;

mod error_kind;
mod record;

// Public transactions module (backend-agnostic executor abstractions)
pub mod transactions;

pub use error_kind::{classify_sqlstate, DbErrorKind};
pub use record::{IntoRecord, Record, RECORD_SNAPSHOT_LIMIT};

use std::fmt;

/// A backend-agnostic scalar value bound as a statement parameter.
/// Backends convert these into their driver's parameter types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Date(chrono::NaiveDate),
    Timestamp(chrono::NaiveDateTime),
    TimestampTz(chrono::DateTime<chrono::Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::I32(i) => write!(f, "{}", i),
            SqlValue::I64(i) => write!(f, "{}", i),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::String(s) => write!(f, "{:?}", s),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Timestamp(t) => write!(f, "{}", t),
            SqlValue::TimestampTz(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

macro_rules! sql_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v.into())
                }
            }
        )*
    };
}

sql_value_from! {
    bool => Bool,
    i16 => I32,
    i32 => I32,
    u16 => I32,
    i64 => I64,
    u32 => I64,
    f32 => F64,
    f64 => F64,
    String => String,
    &str => String,
    &String => String,
    chrono::NaiveDate => Date,
    chrono::NaiveDateTime => Timestamp,
    chrono::DateTime<chrono::Utc> => TimestampTz,
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// SQL flavour produced by the statement builder for a given executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `$1, $2, ...` placeholders with explicit casts inside VALUES sources.
    Postgres,
    /// `?` placeholders, no casts.
    #[default]
    Generic,
}

/// A fully rendered, parameterized statement ready for an executor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new<S: Into<String>>(sql: S, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Columns that identify an existing row for update/upsert matching.
/// Composite keys are matched with AND semantics, in the given order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    columns: Vec<String>,
}

impl KeySpec {
    pub fn single<S: Into<String>>(column: S) -> Self {
        Self {
            columns: vec![column.into()],
        }
    }

    /// Build a (possibly composite) key. Rejects an empty list and duplicate names.
    pub fn composite<I, S>(columns: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for c in columns {
            let c = c.into();
            if out.contains(&c) {
                return Err(DbError::InvalidKeySpec {
                    reason: format!("duplicate key column `{}`", c),
                });
            }
            out.push(c);
        }
        if out.is_empty() {
            return Err(DbError::InvalidKeySpec {
                reason: "at least one key column is required".to_string(),
            });
        }
        Ok(Self { columns: out })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

impl From<&str> for KeySpec {
    fn from(column: &str) -> Self {
        KeySpec::single(column)
    }
}

/// The three bulk write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Insert,
    Update,
    Upsert,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperation::Insert => "insert",
            BatchOperation::Update => "update",
            BatchOperation::Upsert => "upsert",
        }
    }
}

impl fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of one top-level batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchResult {
    /// Input records processed.
    pub total_records: usize,
    /// Chunks (round-trips) executed.
    pub batch_count: usize,
}

/// Compile-time metadata for typed records.
/// Implemented via `#[derive(Batchable)]` in `sqlbatch_macros`.
pub trait Batchable: IntoRecord {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    /// Columns marked with `#[batch(key)]`, in declaration order.
    const KEY_COLUMNS: &'static [&'static str];

    /// The key spec for update/upsert, if any key column was declared.
    fn key_spec() -> DbResult<KeySpec> {
        KeySpec::composite(Self::KEY_COLUMNS.iter().copied())
    }
}

/// Error type for batch operations and executors.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A batch sizing was requested for an empty record sequence.
    #[error("empty input: at least one record is required")]
    EmptyInput,
    /// A record without any column cannot be sized or rendered.
    #[error("record at index {index} has no columns")]
    Shape { index: usize },
    /// A key column needed for update/upsert matching is absent or null.
    #[error("{operation}: key column `{key}` is missing or null in record at index {index}: {snapshot}")]
    KeyMissing {
        key: String,
        index: usize,
        operation: BatchOperation,
        snapshot: String,
    },
    #[error("invalid key spec: {reason}")]
    InvalidKeySpec { reason: String },
    #[error("invalid identifier `{ident}`: {reason}")]
    InvalidIdentifier { ident: String, reason: &'static str },
    /// Update-only matching needs at least one non-key column to assign.
    #[error("no non-key columns to update in `{table}`")]
    NoUpdatableColumns { table: String },
    #[error("cannot begin a transaction inside an existing transaction")]
    NestedTransaction,
    /// Opaque backend error from the underlying driver, carried unmodified.
    #[error("backend error")]
    Backend {
        /// Driver error code (SQLSTATE for Postgres), when the driver reports one.
        code: Option<String>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DbError {
    /// Wrap a backend/driver error.
    pub fn backend<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DbError::Backend {
            code: None,
            source: Box::new(e),
        }
    }

    /// Wrap a backend/driver error together with its error code.
    pub fn backend_with_code<E>(code: Option<String>, e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DbError::Backend {
            code,
            source: Box::new(e),
        }
    }

    /// Semantic classification of this error.
    pub fn kind(&self) -> DbErrorKind {
        match self {
            DbError::Backend { code: Some(code), .. } => classify_sqlstate(code),
            DbError::Backend { code: None, .. } => DbErrorKind::Unknown,
            DbError::NestedTransaction => DbErrorKind::Transaction,
            _ => DbErrorKind::Validation,
        }
    }
}

/// Convenience alias for results returned by executors and batch operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build a [`Record`] from `column => value` pairs.
///
/// ```
/// let r = sqlbatch_core::record! { "id" => 1i64, "name" => "a" };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($col:expr => $val:expr),+ $(,)?) => {{
        let mut r = $crate::Record::new();
        $( r.insert($col, $val); )+
        r
    }};
}
