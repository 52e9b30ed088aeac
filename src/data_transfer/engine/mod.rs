// =====================================================
// TRANSFER ENGINE
// Chunked table copy between two handles, one transaction per chunk
// =====================================================

use super::connection_resolver::ConnectionResolver;
use super::jobs::TransferJobStore;
use super::models::TransferRequest;
use crate::config::EngineConfig;
use crate::connections::PooledConnectionHandle;
use crate::db_types::{BindValue, ColumnDescriptor};
use crate::dialect::{build_insert_query, build_paging_query};
use crate::error::{BridgeError, BridgeResult};
use crate::metadata::{order_columns, SchemaDiscoveryService};
use crate::validator::ensure_identifier;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Totals of a finished copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTotals {
    pub rows: u64,
    pub chunks: usize,
}

#[derive(Debug, Clone)]
pub struct TransferEngine {
    discovery: SchemaDiscoveryService,
    chunk_size: usize,
}

impl TransferEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            discovery: SchemaDiscoveryService::new(config),
            chunk_size: config.transfer_chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copies every row of `table_name` from `source` into the same-named
    /// table at `destination`.
    ///
    /// Each chunk is read with a keyed page query and written in its own
    /// destination transaction. `job` is credited only after a commit.
    /// Cancellation is checked before each chunk, never inside one.
    pub async fn copy_table(
        &self,
        source: &PooledConnectionHandle,
        destination: &PooledConnectionHandle,
        table_name: &str,
        cancel: &CancellationToken,
        job: Option<(&TransferJobStore, &str)>,
    ) -> BridgeResult<TransferTotals> {
        ensure_identifier(table_name)?;

        let destination_columns = self.discovery.list_columns(destination, table_name).await?;
        let source_columns = self.discovery.list_columns(source, table_name).await?;
        let mapping = map_columns(table_name, &destination_columns, &source_columns);
        let insert_sql = build_insert_query(destination.database_type(), table_name, &destination_columns)?;
        let order_by = order_columns(&source_columns);

        let mut totals = TransferTotals::default();
        let mut chunk_index = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }

            let page_query = build_paging_query(
                source.database_type(),
                table_name,
                chunk_index as u64,
                self.chunk_size,
                &order_by,
            )?;
            let batch = source
                .fetch_records(&page_query.sql)
                .await
                .map_err(|e| chunk_failed(chunk_index, e))?;
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();

            let positions = source_positions(&batch.columns, &mapping);
            let binds = batch
                .rows
                .iter()
                .map(|row| bind_row(row, &positions))
                .collect::<Vec<_>>();
            destination
                .execute_batch(&insert_sql, &binds)
                .await
                .map_err(|e| chunk_failed(chunk_index, e))?;

            totals.rows = totals.rows.saturating_add(fetched as u64);
            totals.chunks += 1;
            if let Some((jobs, job_id)) = job {
                jobs.record_chunk(job_id, fetched).await;
            }
            log::debug!(
                "Committed chunk {} of '{}' ({} rows, {} total)",
                chunk_index,
                table_name,
                fetched,
                totals.rows
            );

            if fetched < self.chunk_size {
                break;
            }
            chunk_index += 1;
        }

        Ok(totals)
    }
}

fn chunk_failed(chunk_index: usize, error: BridgeError) -> BridgeError {
    BridgeError::ChunkTransferFailed {
        chunk_index,
        cause: error.to_string(),
    }
}

/// Source column name for each destination column, matched without regard
/// to case. Destination columns missing at the source are written as NULL.
pub(crate) fn map_columns(
    table_name: &str,
    destination: &[ColumnDescriptor],
    source: &[ColumnDescriptor],
) -> Vec<Option<String>> {
    destination
        .iter()
        .map(|target| {
            let found = source
                .iter()
                .find(|column| column.name.eq_ignore_ascii_case(&target.name))
                .map(|column| column.name.clone());
            if found.is_none() {
                log::warn!(
                    "Column '{}' of '{}' has no source counterpart; writing NULL",
                    target.name,
                    table_name
                );
            }
            found
        })
        .collect()
}

/// Index into the fetched result set for each mapped destination column.
pub(crate) fn source_positions(fetched: &[String], mapping: &[Option<String>]) -> Vec<Option<usize>> {
    mapping
        .iter()
        .map(|source| {
            let name = source.as_deref()?;
            fetched
                .iter()
                .position(|column| column == name)
                .or_else(|| fetched.iter().position(|column| column.eq_ignore_ascii_case(name)))
        })
        .collect()
}

pub(crate) fn bind_row(row: &[BindValue], positions: &[Option<usize>]) -> Vec<BindValue> {
    positions
        .iter()
        .map(|position| {
            position
                .and_then(|i| row.get(i))
                .cloned()
                .unwrap_or(BindValue::Null)
        })
        .collect()
}

/// Drives one job through its lifecycle. Both leases are released on every
/// path out of this function.
pub(crate) async fn run_job(
    engine: TransferEngine,
    resolver: ConnectionResolver,
    jobs: Arc<TransferJobStore>,
    job_id: String,
    request: TransferRequest,
    cancel: CancellationToken,
) {
    let source = match resolver
        .lease(&request.owner_id, &request.source_connection_id)
        .await
    {
        Ok(lease) => lease,
        Err(e) => {
            jobs.finalize_failed(&job_id, &e).await;
            return;
        }
    };
    let destination = match resolver
        .lease(&request.owner_id, &request.destination_connection_id)
        .await
    {
        Ok(lease) => lease,
        Err(e) => {
            source.release().await;
            jobs.finalize_failed(&job_id, &e).await;
            return;
        }
    };

    if !jobs.mark_running(&job_id).await {
        source.release().await;
        destination.release().await;
        return;
    }

    let outcome = engine
        .copy_table(
            source.handle(),
            destination.handle(),
            &request.table_name,
            &cancel,
            Some((jobs.as_ref(), job_id.as_str())),
        )
        .await;

    source.release().await;
    destination.release().await;

    match outcome {
        Ok(_) => jobs.finalize_success(&job_id).await,
        Err(e) => jobs.finalize_failed(&job_id, &e).await,
    }
}

#[cfg(test)]
mod tests;
