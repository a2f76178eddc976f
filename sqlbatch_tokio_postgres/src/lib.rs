#![forbid(unsafe_code)]
#![cfg_attr(
    not(feature = "postgres-backend"),
    doc = "Enable feature `postgres-backend` to use this adapter."
)]
//! `tokio-postgres` executor for the sqlbatch engine.
//!
//! MERGE needs PostgreSQL 15 or newer. A [`PostgresExecutor`] wraps one client
//! connection; transactions are plain `BEGIN`/`COMMIT` on that connection, so an
//! executor must not be shared by concurrent batch calls.

#[cfg(feature = "postgres-backend")]
mod backend {
    use std::error::Error;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::BytesMut;
    use futures::FutureExt;
    use sqlbatch_core::transactions::{Executor, Isolation, Transaction, TransactionDefinition};
    use sqlbatch_core::{DbError, DbResult, Dialect, SqlValue, Statement};
    use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
    use tokio_postgres::{Client, NoTls};

    #[cfg(feature = "tracing")]
    use tracing::{debug, error, warn};

    /// Wrap a driver error, keeping its SQLSTATE for [`DbError::kind`].
    pub(crate) fn pg_error(e: tokio_postgres::Error) -> DbError {
        let code = e.code().map(|c| c.code().to_string());
        DbError::backend_with_code(code, e)
    }

    pub(crate) fn isolation_sql(isolation: Isolation) -> Option<&'static str> {
        match isolation {
            Isolation::Default => None,
            Isolation::ReadCommitted => Some("ISOLATION LEVEL READ COMMITTED"),
            Isolation::RepeatableRead => Some("ISOLATION LEVEL REPEATABLE READ"),
            Isolation::Serializable => Some("ISOLATION LEVEL SERIALIZABLE"),
        }
    }

    pub(crate) fn begin_sql(def: &TransactionDefinition) -> String {
        let mut modes: Vec<&str> = Vec::new();
        if let Some(iso) = isolation_sql(def.isolation) {
            modes.push(iso);
        }
        if def.read_only {
            modes.push("READ ONLY");
        }
        if modes.is_empty() {
            "BEGIN".to_string()
        } else {
            format!("BEGIN {}", modes.join(", "))
        }
    }

    /// Binds a [`SqlValue`] to whatever type the server inferred for the parameter.
    ///
    /// Integers widen or narrow to INT2/INT4/INT8 (failing on overflow) and to FLOAT8;
    /// floats narrow to FLOAT4. Everything else defers to the driver's own checks.
    #[derive(Debug)]
    pub(crate) struct PgParam<'a>(pub(crate) &'a SqlValue);

    impl ToSql for PgParam<'_> {
        fn to_sql(
            &self,
            ty: &Type,
            out: &mut BytesMut,
        ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
            match self.0 {
                SqlValue::Null => Ok(IsNull::Yes),
                SqlValue::Bool(b) => b.to_sql_checked(ty, out),
                SqlValue::I32(v) => {
                    if *ty == Type::INT8 {
                        i64::from(*v).to_sql_checked(ty, out)
                    } else if *ty == Type::INT2 {
                        i16::try_from(*v)?.to_sql_checked(ty, out)
                    } else if *ty == Type::FLOAT8 {
                        f64::from(*v).to_sql_checked(ty, out)
                    } else {
                        v.to_sql_checked(ty, out)
                    }
                }
                SqlValue::I64(v) => {
                    if *ty == Type::INT4 {
                        i32::try_from(*v)?.to_sql_checked(ty, out)
                    } else if *ty == Type::INT2 {
                        i16::try_from(*v)?.to_sql_checked(ty, out)
                    } else if *ty == Type::FLOAT8 {
                        (*v as f64).to_sql_checked(ty, out)
                    } else {
                        v.to_sql_checked(ty, out)
                    }
                }
                SqlValue::F64(v) => {
                    if *ty == Type::FLOAT4 {
                        (*v as f32).to_sql_checked(ty, out)
                    } else {
                        v.to_sql_checked(ty, out)
                    }
                }
                SqlValue::String(s) => s.as_str().to_sql_checked(ty, out),
                SqlValue::Date(d) => d.to_sql_checked(ty, out),
                SqlValue::Timestamp(t) => t.to_sql_checked(ty, out),
                SqlValue::TimestampTz(t) => t.to_sql_checked(ty, out),
            }
        }

        fn accepts(_ty: &Type) -> bool {
            true
        }

        to_sql_checked!();
    }

    async fn run(client: &Client, statement: &Statement) -> DbResult<u64> {
        let params: Vec<PgParam<'_>> = statement.params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        client
            .execute(statement.sql.as_str(), &refs[..])
            .await
            .map_err(pg_error)
    }

    /// Standalone executor over a `tokio_postgres::Client`.
    #[derive(Clone)]
    pub struct PostgresExecutor {
        client: Arc<Client>,
    }

    impl PostgresExecutor {
        pub fn new(client: Client) -> Self {
            Self::from_arc(Arc::new(client))
        }

        pub fn from_arc(client: Arc<Client>) -> Self {
            Self { client }
        }

        /// Connect to `conn_str` and drive the connection on the current tokio runtime.
        pub async fn connect(conn_str: &str) -> DbResult<Self> {
            let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
                .await
                .map_err(pg_error)?;
            // The connection object must be spawned to process network events.
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    #[cfg(feature = "tracing")]
                    error!(error = %e, "postgres connection error");
                    #[cfg(not(feature = "tracing"))]
                    eprintln!("Postgres connection error: {}", e);
                }
            });
            Ok(Self::new(client))
        }

        pub fn client(&self) -> &Client {
            &self.client
        }
    }

    #[async_trait]
    impl Executor for PostgresExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn is_in_transaction(&self) -> bool {
            false
        }

        async fn execute(&self, statement: &Statement) -> DbResult<u64> {
            run(&self.client, statement).await
        }

        async fn begin(&self, def: &TransactionDefinition) -> DbResult<Box<dyn Transaction>> {
            let sql = begin_sql(def);
            // Guard first: a cancelled BEGIN still gets its ROLLBACK queued.
            let mut tx = PostgresTransaction {
                client: self.client.clone(),
                finished: false,
            };
            if let Err(e) = self.client.batch_execute(&sql).await {
                tx.finished = true;
                return Err(pg_error(e));
            }
            if let Some(to) = def.timeout {
                let set = format!("SET LOCAL statement_timeout = '{}ms'", to.as_millis());
                if let Err(e) = self.client.batch_execute(&set).await {
                    let _ = tx.rollback().await;
                    return Err(pg_error(e));
                }
            }
            #[cfg(feature = "tracing")]
            debug!(sql = %sql, "postgres transaction opened");
            Ok(Box::new(tx))
        }
    }

    /// An open transaction on a [`PostgresExecutor`]'s connection.
    ///
    /// Dropped without `commit`/`rollback` (for example when the owning future is
    /// cancelled), it queues a `ROLLBACK` on the connection before `drop` returns,
    /// so the next statement sent on the same client runs after it.
    pub struct PostgresTransaction {
        client: Arc<Client>,
        finished: bool,
    }

    impl PostgresTransaction {
        async fn finish(&mut self, sql: &str) -> DbResult<()> {
            self.finished = true;
            self.client.batch_execute(sql).await.map_err(pg_error)
        }
    }

    #[async_trait]
    impl Executor for PostgresTransaction {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn is_in_transaction(&self) -> bool {
            true
        }

        async fn execute(&self, statement: &Statement) -> DbResult<u64> {
            run(&self.client, statement).await
        }

        async fn begin(&self, _def: &TransactionDefinition) -> DbResult<Box<dyn Transaction>> {
            Err(DbError::NestedTransaction)
        }
    }

    #[async_trait]
    impl Transaction for PostgresTransaction {
        fn as_executor(&self) -> &dyn Executor {
            self
        }

        async fn commit(&mut self) -> DbResult<()> {
            self.finish("COMMIT").await
        }

        async fn rollback(&mut self) -> DbResult<()> {
            self.finish("ROLLBACK").await
        }
    }

    impl Drop for PostgresTransaction {
        fn drop(&mut self) {
            if self.finished {
                return;
            }
            self.finished = true;
            #[cfg(feature = "tracing")]
            warn!("postgres transaction dropped while open; rolling back");
            // The first poll hands the request to the connection task; the reply is
            // not awaited.
            let _ = self.client.batch_execute("ROLLBACK").now_or_never();
        }
    }

}

#[cfg(feature = "postgres-backend")]
pub use backend::{PostgresExecutor, PostgresTransaction};
