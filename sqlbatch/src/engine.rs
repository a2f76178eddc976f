//! The batch operation engine: chunking, key validation, statement synthesis and
//! transactional execution of bulk insert, update and upsert.

use std::time::Instant;

use sqlbatch_core::transactions::{Executor, TransactionDefinition, TransactionScope};
use sqlbatch_core::{
    BatchOperation, BatchResult, Batchable, DbResult, IntoRecord, KeySpec, Record,
};
use sqlbatch_sql_builder::{insert_many, merge, quote_table, MergeMode};

use crate::sizing::{compute_chunk_size, DEFAULT_PARAMETER_LIMIT};
use crate::validate::validate_keys;

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// Environment variable read by [`BatchConfig::from_env`].
pub const PARAMETER_LIMIT_ENV: &str = "SQLBATCH_PARAMETER_LIMIT";

/// Tunables for a [`BatchEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum bound parameters per statement.
    pub parameter_limit: usize,
    /// Applied when the engine opens its own transaction.
    pub transaction: TransactionDefinition,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parameter_limit: DEFAULT_PARAMETER_LIMIT,
            transaction: TransactionDefinition::default(),
        }
    }
}

impl BatchConfig {
    /// Set the parameter limit; zero falls back to [`DEFAULT_PARAMETER_LIMIT`].
    pub fn with_parameter_limit(mut self, limit: usize) -> Self {
        self.parameter_limit = if limit == 0 {
            DEFAULT_PARAMETER_LIMIT
        } else {
            limit
        };
        self
    }

    pub fn with_transaction(mut self, def: TransactionDefinition) -> Self {
        self.transaction = def;
        self
    }

    /// Defaults overridden by `SQLBATCH_PARAMETER_LIMIT` when it holds a positive integer.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::default();
        let Some(raw) = lookup(PARAMETER_LIMIT_ENV) else {
            return config;
        };
        match raw.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => config.with_parameter_limit(limit),
            _ => {
                #[cfg(feature = "tracing")]
                warn!(
                    value = %raw,
                    default = DEFAULT_PARAMETER_LIMIT,
                    "ignoring invalid {}", PARAMETER_LIMIT_ENV
                );
                config
            }
        }
    }
}

#[inline]
#[allow(unused_variables)]
fn obs_record(
    op: BatchOperation,
    table: &str,
    start: Instant,
    result: &DbResult<BatchResult>,
    rows: usize,
) {
    let elapsed = start.elapsed().as_millis() as u64;
    let success = result.is_ok();
    let chunks = result.as_ref().map(|r| r.batch_count).unwrap_or(0);
    #[cfg(feature = "tracing")]
    {
        match result {
            Ok(_) => info!(
                op = op.as_str(),
                table = table,
                rows = rows,
                chunks = chunks,
                elapsed_ms = elapsed,
                success = success,
                "batch op"
            ),
            Err(e) => info!(
                op = op.as_str(),
                table = table,
                rows = rows,
                elapsed_ms = elapsed,
                success = success,
                error = %e,
                kind = %e.kind(),
                "batch op"
            ),
        }
    }
    #[cfg(feature = "metrics")]
    {
        metrics::counter!("batch_ops_total", 1, "op" => op.as_str(), "table" => table.to_string(), "success" => success.to_string());
        metrics::histogram!("batch_op_duration_ms", elapsed as f64, "op" => op.as_str(), "table" => table.to_string());
        if !success {
            metrics::counter!("batch_op_errors_total", 1, "op" => op.as_str(), "table" => table.to_string());
        }
    }
}

/// What a call writes, and with which key.
#[derive(Clone, Copy)]
enum Write<'k> {
    Insert,
    Update(&'k KeySpec),
    Upsert(&'k KeySpec),
}

impl Write<'_> {
    fn operation(&self) -> BatchOperation {
        match self {
            Write::Insert => BatchOperation::Insert,
            Write::Update(_) => BatchOperation::Update,
            Write::Upsert(_) => BatchOperation::Upsert,
        }
    }
}

/// Runs bulk writes with a fixed [`BatchConfig`].
#[derive(Debug, Clone, Default)]
pub struct BatchEngine {
    config: BatchConfig,
}

impl BatchEngine {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Insert `records` into `table`, one multi-row INSERT per chunk.
    pub async fn insert(
        &self,
        executor: &dyn Executor,
        table: &str,
        records: &[Record],
    ) -> DbResult<BatchResult> {
        self.run(executor, table, records, Write::Insert).await
    }

    /// Update rows of `table` matched on `keys`; records without a matching row are skipped.
    pub async fn update(
        &self,
        executor: &dyn Executor,
        table: &str,
        records: &[Record],
        keys: &KeySpec,
    ) -> DbResult<BatchResult> {
        self.run(executor, table, records, Write::Update(keys)).await
    }

    /// Update matched rows of `table` and insert the rest.
    pub async fn upsert(
        &self,
        executor: &dyn Executor,
        table: &str,
        records: &[Record],
        keys: &KeySpec,
    ) -> DbResult<BatchResult> {
        self.run(executor, table, records, Write::Upsert(keys)).await
    }

    pub async fn insert_entities<T: Batchable>(
        &self,
        executor: &dyn Executor,
        entities: &[T],
    ) -> DbResult<BatchResult> {
        let records = to_records(entities);
        self.insert(executor, T::TABLE, &records).await
    }

    /// Update using the key columns declared with `#[batch(key)]`.
    pub async fn update_entities<T: Batchable>(
        &self,
        executor: &dyn Executor,
        entities: &[T],
    ) -> DbResult<BatchResult> {
        let keys = T::key_spec()?;
        let records = to_records(entities);
        self.update(executor, T::TABLE, &records, &keys).await
    }

    /// Upsert using the key columns declared with `#[batch(key)]`.
    pub async fn upsert_entities<T: Batchable>(
        &self,
        executor: &dyn Executor,
        entities: &[T],
    ) -> DbResult<BatchResult> {
        let keys = T::key_spec()?;
        let records = to_records(entities);
        self.upsert(executor, T::TABLE, &records, &keys).await
    }

    async fn run(
        &self,
        executor: &dyn Executor,
        table: &str,
        records: &[Record],
        write: Write<'_>,
    ) -> DbResult<BatchResult> {
        // Nothing to do: no transaction, no statements.
        if records.is_empty() {
            return Ok(BatchResult::default());
        }
        let start = Instant::now();
        let result = self.run_chunked(executor, table, records, write).await;
        obs_record(write.operation(), table, start, &result, records.len());
        result
    }

    async fn run_chunked(
        &self,
        executor: &dyn Executor,
        table: &str,
        records: &[Record],
        write: Write<'_>,
    ) -> DbResult<BatchResult> {
        // Input problems surface before any transaction is opened.
        quote_table(table)?;
        let chunk_size = compute_chunk_size(records, self.config.parameter_limit)?;

        let scope = TransactionScope::enter(executor, &self.config.transaction).await?;
        let outcome = execute_chunks(scope.executor(), table, records, write, chunk_size).await;
        scope.finish(outcome).await
    }
}

/// Execute every chunk in input order on `executor`, stopping at the first error.
async fn execute_chunks(
    executor: &dyn Executor,
    table: &str,
    records: &[Record],
    write: Write<'_>,
    chunk_size: usize,
) -> DbResult<BatchResult> {
    let dialect = executor.dialect();
    let operation = write.operation();
    let mut batch_count = 0;

    for (i, chunk) in records.chunks(chunk_size).enumerate() {
        let chunk_start = i * chunk_size;
        let statement = match write {
            Write::Insert => insert_many(dialect, table, chunk)?,
            Write::Update(keys) => {
                validate_keys(chunk, keys, chunk_start, operation)?;
                merge(dialect, table, chunk, keys, MergeMode::UpdateOnly)?
            }
            Write::Upsert(keys) => {
                validate_keys(chunk, keys, chunk_start, operation)?;
                merge(dialect, table, chunk, keys, MergeMode::Upsert)?
            }
        };
        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let affected = executor.execute(&statement).await?;
        batch_count += 1;

        #[cfg(feature = "tracing")]
        debug!(
            op = operation.as_str(),
            table = table,
            chunk = i,
            rows = chunk.len(),
            params = statement.params.len(),
            affected = affected,
            "chunk executed"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!("batch_chunks_total", 1, "op" => operation.as_str(), "table" => table.to_string());
    }

    Ok(BatchResult {
        total_records: records.len(),
        batch_count,
    })
}

fn to_records<T: IntoRecord>(entities: &[T]) -> Vec<Record> {
    entities.iter().map(IntoRecord::to_record).collect()
}

/// Insert `records` into `table` with the default configuration.
///
/// Runs in the executor's transaction when it is bound to one, otherwise in a new
/// transaction covering every chunk.
pub async fn batch_insert(
    executor: &dyn Executor,
    table: &str,
    records: &[Record],
) -> DbResult<BatchResult> {
    BatchEngine::default().insert(executor, table, records).await
}

/// Update rows matched on `keys` with the default configuration.
pub async fn batch_update(
    executor: &dyn Executor,
    table: &str,
    records: &[Record],
    keys: &KeySpec,
) -> DbResult<BatchResult> {
    BatchEngine::default()
        .update(executor, table, records, keys)
        .await
}

/// Update-or-insert rows matched on `keys` with the default configuration.
pub async fn batch_upsert(
    executor: &dyn Executor,
    table: &str,
    records: &[Record],
    keys: &KeySpec,
) -> DbResult<BatchResult> {
    BatchEngine::default()
        .upsert(executor, table, records, keys)
        .await
}

pub async fn batch_insert_entities<T: Batchable>(
    executor: &dyn Executor,
    entities: &[T],
) -> DbResult<BatchResult> {
    BatchEngine::default()
        .insert_entities(executor, entities)
        .await
}

pub async fn batch_update_entities<T: Batchable>(
    executor: &dyn Executor,
    entities: &[T],
) -> DbResult<BatchResult> {
    BatchEngine::default()
        .update_entities(executor, entities)
        .await
}

pub async fn batch_upsert_entities<T: Batchable>(
    executor: &dyn Executor,
    entities: &[T],
) -> DbResult<BatchResult> {
    BatchEngine::default()
        .upsert_entities(executor, entities)
        .await
}
