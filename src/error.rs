// =====================================================
// ERROR TYPES
// Typed failures shared by every layer of the bridge
// =====================================================

use serde::{Deserialize, Serialize};
use std::fmt;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Cause tag attached to a failed connection attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectFailure {
    /// The server refused the connection or could not be resolved.
    Unreachable,
    /// No connection was obtained within the acquire timeout.
    Timeout,
    /// The server rejected the credentials.
    Authentication,
    /// A connection was opened but the liveness probe failed.
    ProbeFailed,
    /// The engine's driver is not compiled into this build.
    DriverUnavailable,
    /// The credentials or URL could not be turned into connect options.
    Configuration,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectFailure::Unreachable => "unreachable",
            ConnectFailure::Timeout => "timeout",
            ConnectFailure::Authentication => "authentication",
            ConnectFailure::ProbeFailed => "probe failed",
            ConnectFailure::DriverUnavailable => "driver unavailable",
            ConnectFailure::Configuration => "configuration",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unsupported database type: {0}")]
    UnsupportedDialect(String),

    #[error("Missing required credential field: {0}")]
    MissingRequiredCredentialField(&'static str),

    #[error("SID or service name is required for Oracle connections")]
    MissingOracleIdentifier,

    #[error("Connection test failed ({failure}): {message}")]
    ConnectionTestFailed {
        failure: ConnectFailure,
        message: String,
    },

    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Query contains characters outside the allowed set")]
    InvalidQuery,

    #[error("Invalid page request: {0}")]
    InvalidPageRequest(String),

    #[error("Connection '{connection_id}' is unavailable: {reason}")]
    ConnectionUnavailable {
        connection_id: String,
        reason: String,
    },

    #[error("Chunk {chunk_index} failed: {cause}")]
    ChunkTransferFailed { chunk_index: usize, cause: String },

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transfer job '{0}' not found")]
    JobNotFound(String),

    #[error("Connection store error: {0}")]
    Store(String),
}

impl BridgeError {
    pub fn connect(failure: ConnectFailure, message: impl Into<String>) -> Self {
        BridgeError::ConnectionTestFailed {
            failure,
            message: message.into(),
        }
    }

    pub fn unavailable(connection_id: &str, reason: impl Into<String>) -> Self {
        BridgeError::ConnectionUnavailable {
            connection_id: connection_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the caller's input; nothing was sent to a database.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            BridgeError::UnsupportedDialect(_)
                | BridgeError::MissingRequiredCredentialField(_)
                | BridgeError::MissingOracleIdentifier
                | BridgeError::InvalidIdentifier(_)
                | BridgeError::InvalidQuery
                | BridgeError::InvalidPageRequest(_)
                | BridgeError::UnknownTable(_)
        )
    }

    pub fn is_connectivity_error(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionTestFailed { .. } | BridgeError::ConnectionUnavailable { .. }
        )
    }

    /// Short machine-readable tag, stored on failed transfer jobs.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::UnsupportedDialect(_) => "unsupported_dialect",
            BridgeError::MissingRequiredCredentialField(_) => "missing_required_credential_field",
            BridgeError::MissingOracleIdentifier => "missing_oracle_identifier",
            BridgeError::ConnectionTestFailed { .. } => "connection_test_failed",
            BridgeError::UnknownTable(_) => "unknown_table",
            BridgeError::InvalidIdentifier(_) => "invalid_identifier",
            BridgeError::InvalidQuery => "invalid_query",
            BridgeError::InvalidPageRequest(_) => "invalid_page_request",
            BridgeError::ConnectionUnavailable { .. } => "connection_unavailable",
            BridgeError::ChunkTransferFailed { .. } => "chunk_transfer_failed",
            BridgeError::Cancelled => "cancelled",
            BridgeError::Query(_) => "query",
            BridgeError::JobNotFound(_) => "job_not_found",
            BridgeError::Store(_) => "store",
        }
    }
}

/// Maps a sqlx connect-time error onto a cause tag.
pub(crate) fn classify_sqlx_connect_error(error: &sqlx::Error) -> ConnectFailure {
    match error {
        sqlx::Error::PoolTimedOut => ConnectFailure::Timeout,
        sqlx::Error::Io(_) => ConnectFailure::Unreachable,
        sqlx::Error::Tls(_) => ConnectFailure::Unreachable,
        sqlx::Error::Configuration(_) => ConnectFailure::Configuration,
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_ascii_lowercase();
            if message.contains("password") || message.contains("access denied") || message.contains("authentication") {
                ConnectFailure::Authentication
            } else {
                ConnectFailure::ProbeFailed
            }
        }
        _ => ConnectFailure::ProbeFailed,
    }
}

/// Statement-time sqlx error. Pool and socket failures keep their connect tag
/// so callers can tell an unreachable server from a rejected statement.
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> BridgeError {
    match &error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => BridgeError::connect(classify_sqlx_connect_error(&error), error.to_string()),
        _ => BridgeError::Query(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_and_connectivity_classes_are_disjoint() {
        let caller = BridgeError::InvalidIdentifier("a b".into());
        assert!(caller.is_caller_error());
        assert!(!caller.is_connectivity_error());

        let connectivity = BridgeError::connect(ConnectFailure::Unreachable, "refused");
        assert!(connectivity.is_connectivity_error());
        assert!(!connectivity.is_caller_error());

        let chunk = BridgeError::ChunkTransferFailed {
            chunk_index: 1,
            cause: "constraint".into(),
        };
        assert!(!chunk.is_caller_error());
        assert!(!chunk.is_connectivity_error());
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::ChunkTransferFailed {
            chunk_index: 2,
            cause: "duplicate key".into(),
        };
        assert_eq!(err.to_string(), "Chunk 2 failed: duplicate key");
        assert_eq!(err.kind(), "chunk_transfer_failed");

        let err = BridgeError::connect(ConnectFailure::Timeout, "no reply");
        assert_eq!(err.to_string(), "Connection test failed (timeout): no reply");
    }

    #[test]
    fn test_pool_timeout_is_classified_as_timeout() {
        assert_eq!(
            classify_sqlx_connect_error(&sqlx::Error::PoolTimedOut),
            ConnectFailure::Timeout
        );
    }

    #[test]
    fn test_statement_errors_stay_query_errors() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            BridgeError::Query(_)
        ));
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_connectivity_error());
    }
}
