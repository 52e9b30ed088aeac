// Runtime database connections, schema browsing and chunked table transfer.

pub mod config;
pub mod connections;
pub mod data_transfer;
pub mod db_types;
pub mod dialect;
pub mod error;
pub mod metadata;
pub mod service;
pub mod store;
pub mod validator;

// Engine backends
mod mssql;
mod mysql;
#[cfg(feature = "oracle")]
mod oracle_db;
mod postgres;
mod sqlite;

#[cfg(test)]
mod test_support;

pub use config::{EngineConfig, PoolSettings};
pub use connections::{ConnectionPoolManager, OwnerConnectionRegistry, PooledConnectionHandle};
pub use data_transfer::{TransferEngine, TransferFailure, TransferJob, TransferJobStatus, TransferRequest};
pub use db_types::{BindValue, ColumnDescriptor, ConnectionCredentials, DatabaseType, QueryResult, RecordBatch, Row, TablePage};
pub use error::{BridgeError, BridgeResult, ConnectFailure};
pub use metadata::SchemaDiscoveryService;
pub use service::DataBridgeService;
pub use store::{ConnectionRecord, CredentialStore, InMemoryCredentialStore};
