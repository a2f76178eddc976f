//! Backend-agnostic executor and transaction abstractions.
//!
//! An [`Executor`] is either a standalone connection handle or a handle already bound
//! to a transaction; [`Executor::is_in_transaction`] tells the two apart. The
//! [`TransactionScope`] coordinator reuses a bound executor as-is and otherwise opens
//! exactly one transaction, so composed calls never nest.

use std::time::Duration;

use futures_core::future::BoxFuture;

use crate::{DbResult, Dialect, Statement};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Transaction isolation level (best-effort across backends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    #[default]
    Default,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Settings applied when a new transaction is opened.
/// Ignored when the caller already supplies a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionDefinition {
    pub isolation: Isolation,
    pub read_only: bool,
    pub timeout: Option<Duration>,
}

/// Capability to run parameterized statements against a database.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// SQL flavour this executor understands.
    fn dialect(&self) -> Dialect;

    /// True when this handle is already bound to an open transaction.
    fn is_in_transaction(&self) -> bool;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&self, statement: &Statement) -> DbResult<u64>;

    /// Open a new transaction. Implementations return [`crate::DbError::NestedTransaction`]
    /// when called on a handle that is already in a transaction.
    async fn begin(&self, def: &TransactionDefinition) -> DbResult<Box<dyn Transaction>>;
}

/// An open transaction. Exactly one of `commit`/`rollback` must be called.
#[async_trait::async_trait]
pub trait Transaction: Executor {
    /// View this transaction as a plain executor.
    fn as_executor(&self) -> &dyn Executor;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;
}

/// Which side of the coordinator a scope is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// The caller's executor was already in a transaction; it is used directly.
    Bound,
    /// The scope opened (and owns) the transaction.
    Standalone,
}

enum ScopeInner<'e> {
    Bound(&'e dyn Executor),
    Owned(Box<dyn Transaction>),
}

/// Transaction scope for a unit of work.
///
/// `enter` either borrows a caller-supplied transaction or begins a new one;
/// `finish` commits or rolls back only what the scope itself opened.
pub struct TransactionScope<'e> {
    inner: ScopeInner<'e>,
}

impl<'e> TransactionScope<'e> {
    pub async fn enter(executor: &'e dyn Executor, def: &TransactionDefinition) -> DbResult<Self> {
        if executor.is_in_transaction() {
            #[cfg(feature = "tracing")]
            debug!("reusing caller transaction");
            return Ok(Self {
                inner: ScopeInner::Bound(executor),
            });
        }
        let tx = executor.begin(def).await?;
        #[cfg(feature = "tracing")]
        debug!(isolation = ?def.isolation, read_only = def.read_only, "transaction started");
        Ok(Self {
            inner: ScopeInner::Owned(tx),
        })
    }

    pub fn state(&self) -> TxState {
        match self.inner {
            ScopeInner::Bound(_) => TxState::Bound,
            ScopeInner::Owned(_) => TxState::Standalone,
        }
    }

    /// The executor all work of this scope must run on.
    pub fn executor(&self) -> &dyn Executor {
        match &self.inner {
            ScopeInner::Bound(e) => *e,
            ScopeInner::Owned(tx) => tx.as_executor(),
        }
    }

    /// Settle the scope with the outcome of its work.
    ///
    /// Owned transactions commit on `Ok` and roll back on `Err`. A failed rollback is
    /// logged and the original error is returned. Bound scopes pass `result` through;
    /// the caller decides the fate of its own transaction.
    pub async fn finish<R>(self, result: DbResult<R>) -> DbResult<R> {
        let mut tx = match self.inner {
            ScopeInner::Bound(_) => return result,
            ScopeInner::Owned(tx) => tx,
        };
        match result {
            Ok(v) => {
                tx.commit().await?;
                #[cfg(feature = "tracing")]
                debug!("transaction committed");
                Ok(v)
            }
            Err(e) => {
                #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
                let rolled_back = tx.rollback().await;
                #[cfg(feature = "tracing")]
                {
                    if let Err(rb) = &rolled_back {
                        warn!(error = %rb, "rollback failed");
                    }
                    debug!(error = %e, "transaction rolled back");
                }
                Err(e)
            }
        }
    }
}

/// Run `work` inside a transaction: the caller's, if `executor` is already bound to
/// one, otherwise a new one that is committed on success and rolled back on error.
///
/// ```ignore
/// let n = in_transaction(&exec, &TransactionDefinition::default(), move |tx| {
///     Box::pin(async move {
///         let a = batch_insert(tx, "events", &rows).await?;
///         let b = batch_upsert(tx, "totals", &totals, &KeySpec::single("id")).await?;
///         Ok(a.total_records + b.total_records)
///     })
/// })
/// .await?;
/// ```
pub async fn in_transaction<R, F>(
    executor: &dyn Executor,
    def: &TransactionDefinition,
    work: F,
) -> DbResult<R>
where
    F: for<'t> FnOnce(&'t dyn Executor) -> BoxFuture<'t, DbResult<R>> + Send,
    R: Send,
{
    let scope = TransactionScope::enter(executor, def).await?;
    let result = work(scope.executor()).await;
    scope.finish(result).await
}
