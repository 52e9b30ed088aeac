// =====================================================
// CONNECTION POOL MANAGER
// Builds pooled handles from credentials, probes and closes them
// =====================================================

mod registry;

pub use registry::OwnerConnectionRegistry;

use crate::config::PoolSettings;
use crate::db_types::{BindValue, ConnectionCredentials, DatabaseType, QueryResult, RecordBatch};
use crate::dialect::{self, Endpoint};
use crate::error::{BridgeError, BridgeResult, ConnectFailure};
use crate::{mssql, mysql, postgres, sqlite};
use sqlx::{MySql, Pool, Postgres, Sqlite};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Pool Backends ---

enum PoolBackend {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
    Mssql(deadpool_tiberius::Pool),
    #[cfg(feature = "oracle")]
    Oracle(Arc<::oracle::pool::Pool>),
}

struct HandleInner {
    connection_id: String,
    db_type: DatabaseType,
    url: String,
    acquire_timeout: Duration,
    backend: PoolBackend,
    closed: AtomicBool,
}

/// A live pool bound to one credential set. Clones share the same pool.
///
/// Handles are only produced by [`ConnectionPoolManager::create_and_test`],
/// so every handle has answered a liveness probe at least once.
#[derive(Clone)]
pub struct PooledConnectionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for PooledConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionHandle")
            .field("connection_id", &self.inner.connection_id)
            .field("db_type", &self.inner.db_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PooledConnectionHandle {
    fn new(
        connection_id: String,
        db_type: DatabaseType,
        url: String,
        acquire_timeout: Duration,
        backend: PoolBackend,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                connection_id,
                db_type,
                url,
                acquire_timeout,
                backend,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.connection_id
    }

    pub fn database_type(&self) -> DatabaseType {
        self.inner.db_type
    }

    /// JDBC-style URL the handle was built from.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// True when both values refer to the same underlying pool.
    pub fn same_pool(&self, other: &PooledConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_open(&self) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::unavailable(&self.inner.connection_id, "handle is closed"));
        }
        Ok(())
    }

    // Pool-level failures on a live handle are reported as an unavailable
    // connection rather than a failed connection test.
    fn map_runtime_error(&self, error: BridgeError) -> BridgeError {
        match error {
            BridgeError::ConnectionTestFailed { failure, message } => BridgeError::unavailable(
                &self.inner.connection_id,
                format!("{}: {}", failure, message),
            ),
            other => other,
        }
    }

    async fn run_fetch(&self, sql: &str) -> BridgeResult<RecordBatch> {
        match &self.inner.backend {
            PoolBackend::Postgres(pool) => postgres::fetch_records(pool, sql).await,
            PoolBackend::MySql(pool) => mysql::fetch_records(pool, sql).await,
            PoolBackend::Sqlite(pool) => sqlite::fetch_records(pool, sql).await,
            PoolBackend::Mssql(pool) => mssql::fetch_records(pool, self.inner.acquire_timeout, sql).await,
            #[cfg(feature = "oracle")]
            PoolBackend::Oracle(pool) => crate::oracle_db::fetch_records(pool.clone(), sql.to_string()).await,
        }
    }

    /// Runs `sql` and returns the last result set it produced, rendered as
    /// JSON values.
    pub async fn fetch(&self, sql: &str) -> BridgeResult<QueryResult> {
        self.fetch_records(sql).await.map(RecordBatch::into_query_result)
    }

    /// Like [`Self::fetch`] but keeps typed cells, so binary values stay bytes.
    pub async fn fetch_records(&self, sql: &str) -> BridgeResult<RecordBatch> {
        self.ensure_open()?;
        self.run_fetch(sql).await.map_err(|e| self.map_runtime_error(e))
    }

    /// Executes `sql` once per row in a single transaction on one pooled
    /// connection. Either every row lands or none does.
    pub async fn execute_batch(&self, sql: &str, rows: &[Vec<BindValue>]) -> BridgeResult<u64> {
        self.ensure_open()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let outcome = match &self.inner.backend {
            PoolBackend::Postgres(pool) => postgres::execute_batch(pool, sql, rows).await,
            PoolBackend::MySql(pool) => mysql::execute_batch(pool, sql, rows).await,
            PoolBackend::Sqlite(pool) => sqlite::execute_batch(pool, sql, rows).await,
            PoolBackend::Mssql(pool) => {
                mssql::execute_batch(pool, self.inner.acquire_timeout, sql, rows).await
            }
            #[cfg(feature = "oracle")]
            PoolBackend::Oracle(pool) => {
                crate::oracle_db::execute_batch(pool.clone(), sql.to_string(), rows.to_vec()).await
            }
        };
        outcome.map_err(|e| self.map_runtime_error(e))
    }

    /// Releases every pooled connection. Returns false when the handle was
    /// already closed; a second close is a no-op.
    pub async fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        match &self.inner.backend {
            PoolBackend::Postgres(pool) => pool.close().await,
            PoolBackend::MySql(pool) => pool.close().await,
            PoolBackend::Sqlite(pool) => pool.close().await,
            PoolBackend::Mssql(pool) => pool.close(),
            #[cfg(feature = "oracle")]
            PoolBackend::Oracle(pool) => crate::oracle_db::close(pool.clone()).await,
        }
        log::info!(
            "Closed {} connection '{}'",
            self.inner.db_type,
            self.inner.connection_id
        );
        true
    }
}

// --- Manager ---

#[derive(Debug, Clone, Default)]
pub struct ConnectionPoolManager {
    settings: PoolSettings,
}

impl ConnectionPoolManager {
    pub fn new(settings: PoolSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    async fn open_backend(
        &self,
        db_type: DatabaseType,
        endpoint: &Endpoint,
        credentials: &ConnectionCredentials,
    ) -> BridgeResult<PoolBackend> {
        match db_type {
            DatabaseType::PostgreSQL => {
                postgres::create_pool(endpoint, credentials, &self.settings)
                    .await
                    .map(PoolBackend::Postgres)
            }
            DatabaseType::MySQL => mysql::create_pool(endpoint, credentials, &self.settings)
                .await
                .map(PoolBackend::MySql),
            DatabaseType::SQLite => sqlite::create_pool(endpoint, &self.settings)
                .await
                .map(PoolBackend::Sqlite),
            DatabaseType::SqlServer => {
                mssql::create_pool(endpoint, credentials, &self.settings).map(PoolBackend::Mssql)
            }
            DatabaseType::Oracle => self.open_oracle(endpoint, credentials).await,
        }
    }

    #[cfg(feature = "oracle")]
    async fn open_oracle(
        &self,
        endpoint: &Endpoint,
        credentials: &ConnectionCredentials,
    ) -> BridgeResult<PoolBackend> {
        crate::oracle_db::create_pool(endpoint, credentials, &self.settings)
            .await
            .map(PoolBackend::Oracle)
    }

    #[cfg(not(feature = "oracle"))]
    async fn open_oracle(
        &self,
        _endpoint: &Endpoint,
        _credentials: &ConnectionCredentials,
    ) -> BridgeResult<PoolBackend> {
        Err(BridgeError::connect(
            ConnectFailure::DriverUnavailable,
            "built without the `oracle` feature",
        ))
    }

    /// Validates credentials, builds a pool and probes it.
    ///
    /// Validation runs before any socket is opened. A failed probe closes
    /// the new pool before the error is returned. The handle is not
    /// registered anywhere.
    pub async fn create_and_test(
        &self,
        credentials: &ConnectionCredentials,
    ) -> BridgeResult<PooledConnectionHandle> {
        let (db_type, endpoint) = dialect::resolve_endpoint(credentials)?;
        let url = dialect::build_connection_url(credentials)?;

        let backend = self
            .open_backend(db_type, &endpoint, credentials)
            .await
            .map_err(|e| {
                log::error!(
                    "Could not open {} pool for '{}': {}",
                    db_type,
                    credentials.connection_id,
                    e
                );
                e
            })?;

        let handle = PooledConnectionHandle::new(
            credentials.connection_id.clone(),
            db_type,
            url,
            self.settings.acquire_timeout(),
            backend,
        );

        let probe = dialect::dialect(db_type).probe_query;
        if let Err(e) = handle.run_fetch(probe).await {
            handle.close().await;
            log::error!(
                "Liveness probe failed for {} connection '{}': {}",
                db_type,
                credentials.connection_id,
                e
            );
            return Err(match e {
                failed @ BridgeError::ConnectionTestFailed { .. } => failed,
                other => BridgeError::connect(ConnectFailure::ProbeFailed, other.to_string()),
            });
        }

        log::info!(
            "Connected {} '{}' ({}:{})",
            db_type,
            credentials.connection_id,
            endpoint.host,
            endpoint.port
        );
        Ok(handle)
    }

    /// Idempotent.
    pub async fn close(&self, handle: &PooledConnectionHandle) {
        handle.close().await;
    }
}

#[cfg(test)]
mod tests;
