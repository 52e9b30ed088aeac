use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub owner_id: String,
    pub source_connection_id: String,
    pub destination_connection_id: String,
    pub table_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferJobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TransferJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Why a job ended in `Failed`. `kind` is [`BridgeError::kind`], so a
/// cancelled job reads `"cancelled"` and a broken chunk `"chunk_transfer_failed"`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailure {
    pub kind: String,
    pub message: String,
    pub chunk_index: Option<usize>,
}

impl From<&BridgeError> for TransferFailure {
    fn from(error: &BridgeError) -> Self {
        let chunk_index = match error {
            BridgeError::ChunkTransferFailed { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        };
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            chunk_index,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TransferJob {
    pub job_id: String,
    pub owner_id: String,
    pub source_connection_id: String,
    pub destination_connection_id: String,
    pub table_name: String,
    pub chunk_size: usize,
    pub status: TransferJobStatus,
    /// Rows whose chunk has committed at the destination.
    pub rows_transferred: u64,
    pub chunks_committed: usize,
    pub cancel_requested: bool,
    pub failure: Option<TransferFailure>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferJob {
    pub fn new(job_id: String, request: &TransferRequest, chunk_size: usize) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            owner_id: request.owner_id.clone(),
            source_connection_id: request.source_connection_id.clone(),
            destination_connection_id: request.destination_connection_id.clone(),
            table_name: request.table_name.clone(),
            chunk_size,
            status: TransferJobStatus::Pending,
            rows_transferred: 0,
            chunks_committed: 0,
            cancel_requested: false,
            failure: None,
            created_at: now,
            started_at: None,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.failure
            .as_ref()
            .map(|failure| failure.kind == BridgeError::Cancelled.kind())
            .unwrap_or(false)
    }
}
