//! Chunk sizing under the database's bound-parameter limit.

use sqlbatch_core::{DbError, DbResult, Record};

#[cfg(feature = "tracing")]
use tracing::warn;

/// Bound parameters allowed per statement when nothing else is configured.
/// Kept well below driver hard limits (65535 on Postgres, 2100 on SQL Server).
pub const DEFAULT_PARAMETER_LIMIT: usize = 2000;

/// Number of records per chunk such that `chunk * max_columns <= parameter_limit`.
///
/// The widest record decides, so heterogeneous inputs never overflow. Fails on an
/// empty slice and on the first record without columns. Never returns 0: when a
/// single record already exceeds the limit the answer is 1 and the database gets
/// the final say.
pub fn compute_chunk_size(records: &[Record], parameter_limit: usize) -> DbResult<usize> {
    if records.is_empty() {
        return Err(DbError::EmptyInput);
    }
    if let Some(index) = records.iter().position(Record::is_empty) {
        return Err(DbError::Shape { index });
    }
    let max_columns = records.iter().map(Record::len).max().unwrap_or(1);
    if max_columns > parameter_limit {
        #[cfg(feature = "tracing")]
        warn!(
            max_columns,
            parameter_limit, "record wider than the parameter limit; using one record per chunk"
        );
        return Ok(1);
    }
    Ok((parameter_limit / max_columns).max(1))
}
