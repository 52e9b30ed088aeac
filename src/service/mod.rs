// =====================================================
// DATA BRIDGE SERVICE
// Inbound operations keyed by (owner id, connection id)
// =====================================================

use crate::config::EngineConfig;
use crate::connections::{ConnectionPoolManager, OwnerConnectionRegistry, PooledConnectionHandle};
use crate::data_transfer::{self, ConnectionResolver, TransferEngine, TransferJob, TransferJobStore, TransferRequest};
use crate::db_types::{ColumnDescriptor, ConnectionCredentials, Row, TablePage};
use crate::error::{BridgeError, BridgeResult};
use crate::metadata::SchemaDiscoveryService;
use crate::store::{ConnectionRecord, CredentialStore, InMemoryCredentialStore};
use crate::validator::{ensure_freeform_query, ensure_identifier};
use std::sync::Arc;

/// Long-lived engine instance. Owns the handle registry and the job table;
/// [`DataBridgeService::shutdown`] tears both down.
pub struct DataBridgeService {
    config: EngineConfig,
    resolver: ConnectionResolver,
    discovery: SchemaDiscoveryService,
    engine: TransferEngine,
    jobs: Arc<TransferJobStore>,
}

fn require(value: &str, field: &'static str) -> BridgeResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::MissingRequiredCredentialField(field));
    }
    Ok(trimmed.to_string())
}

impl DataBridgeService {
    pub fn new(config: EngineConfig, store: Arc<dyn CredentialStore>) -> Self {
        let config = config.validated();
        let resolver = ConnectionResolver::new(
            ConnectionPoolManager::new(config.pool.clone()),
            Arc::new(OwnerConnectionRegistry::new()),
            store,
        );
        Self {
            discovery: SchemaDiscoveryService::new(&config),
            engine: TransferEngine::new(&config),
            jobs: Arc::new(TransferJobStore::new()),
            resolver,
            config,
        }
    }

    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(InMemoryCredentialStore::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<OwnerConnectionRegistry> {
        self.resolver.registry()
    }

    async fn handle(&self, owner_id: &str, connection_id: &str) -> BridgeResult<PooledConnectionHandle> {
        let owner_id = require(owner_id, "ownerId")?;
        self.resolver.registered(&owner_id, connection_id).await
    }

    // --- Connections ---

    /// Tests `credentials`, stores them for `owner_id` and registers the live
    /// handle. Nothing is stored or registered when the test fails.
    pub async fn set_connection(&self, credentials: ConnectionCredentials, owner_id: &str) -> BridgeResult<String> {
        let owner_id = require(owner_id, "ownerId")?;
        let connection_id = require(&credentials.connection_id, "connectionId")?;
        let credentials = ConnectionCredentials {
            connection_id: connection_id.clone(),
            ..credentials
        };

        let handle = self.resolver.manager().create_and_test(&credentials).await?;

        if let Err(e) = self
            .resolver
            .store()
            .save(ConnectionRecord::new(&owner_id, credentials))
            .await
        {
            handle.close().await;
            log::error!("Could not store connection '{}': {}", connection_id, e);
            return Err(e);
        }

        if let Err(e) = self.resolver.registry().register(&owner_id, handle.clone()).await {
            handle.close().await;
            return Err(e);
        }
        Ok(connection_id)
    }

    /// Closes and unregisters the handle. The stored record is kept, so the
    /// next call naming this connection rehydrates it.
    pub async fn disconnect(&self, owner_id: &str, connection_id: &str) -> BridgeResult<()> {
        let owner_id = require(owner_id, "ownerId")?;
        let connection_id = require(connection_id, "connectionId")?;
        let handle = self
            .resolver
            .registry()
            .remove(&owner_id, &connection_id)
            .await
            .ok_or_else(|| BridgeError::unavailable(&connection_id, "not connected"))?;
        handle.close().await;
        Ok(())
    }

    /// Stored connections of `owner_id` with passwords removed.
    pub async fn list_connections(&self, owner_id: &str) -> BridgeResult<Vec<ConnectionCredentials>> {
        let owner_id = require(owner_id, "ownerId")?;
        let records = self.resolver.store().find_all_by_owner(&owner_id).await?;
        Ok(records
            .iter()
            .map(|record| record.credentials.redacted())
            .collect())
    }

    pub async fn get_connection(&self, owner_id: &str, connection_id: &str) -> BridgeResult<ConnectionCredentials> {
        let owner_id = require(owner_id, "ownerId")?;
        let connection_id = require(connection_id, "connectionId")?;
        self.resolver
            .store()
            .find_by_owner_and_connection_id(&owner_id, &connection_id)
            .await?
            .map(|record| record.credentials.redacted())
            .ok_or_else(|| BridgeError::unavailable(&connection_id, "no stored credentials for this owner"))
    }

    // --- Discovery ---

    pub async fn list_tables(&self, owner_id: &str, connection_id: &str) -> BridgeResult<Vec<String>> {
        let handle = self.handle(owner_id, connection_id).await?;
        self.discovery.list_tables(&handle).await
    }

    pub async fn list_columns(
        &self,
        owner_id: &str,
        connection_id: &str,
        table_name: &str,
    ) -> BridgeResult<Vec<ColumnDescriptor>> {
        ensure_identifier(table_name)?;
        let handle = self.handle(owner_id, connection_id).await?;
        self.discovery.list_columns(&handle, table_name).await
    }

    pub async fn get_page(
        &self,
        owner_id: &str,
        connection_id: &str,
        table_name: &str,
        page_number: u64,
        page_size: Option<usize>,
    ) -> BridgeResult<TablePage> {
        ensure_identifier(table_name)?;
        let handle = self.handle(owner_id, connection_id).await?;
        self.discovery
            .get_page(&handle, table_name, page_number, page_size)
            .await
    }

    pub async fn execute_query(&self, owner_id: &str, connection_id: &str, query: &str) -> BridgeResult<Vec<Row>> {
        ensure_freeform_query(query)?;
        let handle = self.handle(owner_id, connection_id).await?;
        self.discovery.execute_query(&handle, query).await
    }

    // --- Transfers ---

    /// Queues a copy of `table_name` and returns its job id immediately. The
    /// job runs on the tokio runtime; poll [`Self::get_job_status`].
    pub async fn start_transfer(
        &self,
        owner_id: &str,
        source_connection_id: &str,
        destination_connection_id: &str,
        table_name: &str,
    ) -> BridgeResult<String> {
        ensure_identifier(table_name)?;
        let request = TransferRequest {
            owner_id: require(owner_id, "ownerId")?,
            source_connection_id: require(source_connection_id, "sourceConnectionId")?,
            destination_connection_id: require(destination_connection_id, "destinationConnectionId")?,
            table_name: table_name.to_string(),
        };

        let (job, cancel) = self.jobs.create(&request, self.engine.chunk_size()).await;
        log::info!(
            "Queued transfer job {} of '{}' ({} -> {})",
            job.job_id,
            request.table_name,
            request.source_connection_id,
            request.destination_connection_id
        );

        tokio::spawn(data_transfer::run_job(
            self.engine.clone(),
            self.resolver.clone(),
            self.jobs.clone(),
            job.job_id.clone(),
            request,
            cancel,
        ));

        Ok(job.job_id)
    }

    pub async fn get_job_status(&self, job_id: &str) -> BridgeResult<TransferJob> {
        self.jobs.get(job_id).await
    }

    /// Asks a job to stop after its current chunk.
    pub async fn cancel_transfer(&self, job_id: &str) -> BridgeResult<TransferJob> {
        self.jobs.cancel(job_id).await
    }

    pub async fn list_jobs(&self) -> Vec<TransferJob> {
        self.jobs.list().await
    }

    /// Signals every unfinished job and closes every registered handle.
    pub async fn shutdown(&self) {
        let cancelled = self.jobs.cancel_all().await;
        let handles = self.resolver.registry().drain().await;
        let closed = handles.len();
        for handle in handles {
            handle.close().await;
        }
        log::info!(
            "Data bridge shut down: {} jobs signalled, {} connections closed",
            cancelled,
            closed
        );
    }
}
