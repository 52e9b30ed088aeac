mod connection_resolver;
mod engine;
mod jobs;
pub mod models;

pub use connection_resolver::{ConnectionResolver, TransferLease};
pub use engine::{TransferEngine, TransferTotals};
pub(crate) use engine::run_job;
pub use jobs::TransferJobStore;
pub use models::{TransferFailure, TransferJob, TransferJobStatus, TransferRequest};
