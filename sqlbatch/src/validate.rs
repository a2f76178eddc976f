use sqlbatch_core::{BatchOperation, DbError, DbResult, KeySpec, Record, RECORD_SNAPSHOT_LIMIT};

/// Check that every record of `chunk` carries a non-null value for every key column.
///
/// Records are checked in order and the first violation wins. The reported index is
/// absolute: `chunk_start` plus the position inside the chunk.
pub fn validate_keys(
    chunk: &[Record],
    keys: &KeySpec,
    chunk_start: usize,
    operation: BatchOperation,
) -> DbResult<()> {
    for (i, record) in chunk.iter().enumerate() {
        let missing = keys
            .columns()
            .iter()
            .find(|k| record.get(k).map_or(true, |v| v.is_null()));
        if let Some(key) = missing {
            return Err(DbError::KeyMissing {
                key: key.clone(),
                index: chunk_start + i,
                operation,
                snapshot: record.snapshot(RECORD_SNAPSHOT_LIMIT),
            });
        }
    }
    Ok(())
}
