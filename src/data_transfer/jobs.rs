use super::models::{TransferFailure, TransferJob, TransferJobStatus, TransferRequest};
use crate::error::{BridgeError, BridgeResult};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct JobEntry {
    job: TransferJob,
    cancel: CancellationToken,
}

/// Job records plus their cancellation tokens. Owned by one service instance.
#[derive(Default)]
pub struct TransferJobStore {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl TransferJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `Pending` job and returns it with the token the engine
    /// checks between chunks.
    pub async fn create(&self, request: &TransferRequest, chunk_size: usize) -> (TransferJob, CancellationToken) {
        let job = TransferJob::new(Uuid::new_v4().to_string(), request, chunk_size);
        let cancel = CancellationToken::new();
        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            job.job_id.clone(),
            JobEntry {
                job: job.clone(),
                cancel: cancel.clone(),
            },
        );
        (job, cancel)
    }

    pub async fn get(&self, job_id: &str) -> BridgeResult<TransferJob> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id.trim())
            .map(|entry| entry.job.clone())
            .ok_or_else(|| BridgeError::JobNotFound(job_id.trim().to_string()))
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<TransferJob> {
        let jobs = self.jobs.lock().await;
        let mut out = jobs.values().map(|entry| entry.job.clone()).collect::<Vec<_>>();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Pending -> Running. Returns false when the job is unknown or already
    /// terminal.
    pub async fn mark_running(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.get_mut(job_id) else {
            return false;
        };
        if entry.job.status != TransferJobStatus::Pending {
            return false;
        }
        let now = Utc::now();
        entry.job.status = TransferJobStatus::Running;
        entry.job.started_at = Some(now);
        entry.job.updated_at = now;
        log::info!("Transfer job {} running", job_id);
        true
    }

    /// Called only after a chunk has committed at the destination.
    pub async fn record_chunk(&self, job_id: &str, rows: usize) {
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.get_mut(job_id) else {
            return;
        };
        if entry.job.status != TransferJobStatus::Running {
            return;
        }
        entry.job.rows_transferred = entry.job.rows_transferred.saturating_add(rows as u64);
        entry.job.chunks_committed += 1;
        entry.job.updated_at = Utc::now();
    }

    pub async fn finalize_success(&self, job_id: &str) {
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.get_mut(job_id) else {
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        entry.job.status = TransferJobStatus::Succeeded;
        entry.job.updated_at = now;
        entry.job.finished_at = Some(now);
        entry.job.failure = None;
        log::info!(
            "Transfer job {} succeeded: {} rows in {} chunks",
            job_id,
            entry.job.rows_transferred,
            entry.job.chunks_committed
        );
    }

    pub async fn finalize_failed(&self, job_id: &str, error: &BridgeError) {
        let mut jobs = self.jobs.lock().await;
        let Some(entry) = jobs.get_mut(job_id) else {
            return;
        };
        if entry.job.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        entry.job.status = TransferJobStatus::Failed;
        entry.job.updated_at = now;
        entry.job.finished_at = Some(now);
        entry.job.failure = Some(TransferFailure::from(error));
        if matches!(error, BridgeError::Cancelled) {
            log::info!(
                "Transfer job {} cancelled after {} rows",
                job_id,
                entry.job.rows_transferred
            );
        } else {
            log::error!(
                "Transfer job {} failed after {} rows: {}",
                job_id,
                entry.job.rows_transferred,
                error
            );
        }
    }

    /// Requests a stop at the next chunk boundary. Terminal jobs are
    /// returned unchanged.
    pub async fn cancel(&self, job_id: &str) -> BridgeResult<TransferJob> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .get_mut(job_id.trim())
            .ok_or_else(|| BridgeError::JobNotFound(job_id.trim().to_string()))?;
        if entry.job.status.is_terminal() {
            return Ok(entry.job.clone());
        }
        entry.cancel.cancel();
        entry.job.cancel_requested = true;
        entry.job.updated_at = Utc::now();
        Ok(entry.job.clone())
    }

    /// Cancels every job that has not finished. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let mut signalled = 0;
        for entry in jobs.values_mut() {
            if !entry.job.status.is_terminal() && !entry.cancel.is_cancelled() {
                entry.cancel.cancel();
                entry.job.cancel_requested = true;
                entry.job.updated_at = Utc::now();
                signalled += 1;
            }
        }
        signalled
    }
}
