//! Durable store error types.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::fmt;

use thiserror::Error;

/// Errors raised while talking to SurrealDB.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurrealStoreError {
    /// Failed to connect, authenticate or select the namespace
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Query execution failed
    #[error("query failed: {reason}")]
    QueryFailed { reason: String },

    /// Two writers touched the same record; the statement may be retried
    #[error("write conflict: {reason}")]
    WriteConflict { reason: String },

    /// A returned row could not be decoded
    #[error("decode error: {reason}")]
    DecodeFailed { reason: String },

    /// Schema definition failed
    #[error("schema error: {reason}")]
    SchemaError { reason: String },

    /// Table names are spliced into DDL and must be plain identifiers
    #[error("invalid table name '{table}'")]
    InvalidTableName { table: String },

    /// Configuration rejected before connecting
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl SurrealStoreError {
    /// Create a connection failed error.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    /// Create a query failed error.
    pub fn query_failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            reason: reason.into(),
        }
    }

    /// Create a decode error.
    pub fn decode_failed(reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            reason: reason.into(),
        }
    }

    /// Create a schema error.
    pub fn schema_error(reason: impl Into<String>) -> Self {
        Self::SchemaError {
            reason: reason.into(),
        }
    }

    /// Create an invalid table name error.
    pub fn invalid_table_name(table: impl Into<String>) -> Self {
        Self::InvalidTableName {
            table: table.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if the failed statement can simply be re-run.
    #[must_use]
    pub const fn is_write_conflict(&self) -> bool {
        matches!(self, Self::WriteConflict { .. })
    }

    /// Convert into the engine error, tagging the failed operation.
    #[must_use]
    pub fn into_core(self, operation: &str) -> idem_core::Error {
        match self {
            Self::InvalidTableName { .. } | Self::InvalidConfig { .. } => {
                idem_core::Error::invalid_config(self.to_string())
            }
            Self::ConnectionFailed { .. }
            | Self::QueryFailed { .. }
            | Self::WriteConflict { .. }
            | Self::DecodeFailed { .. }
            | Self::SchemaError { .. } => {
                idem_core::Error::store_unavailable(operation, self.to_string())
            }
        }
    }
}

impl From<SurrealStoreError> for idem_core::Error {
    fn from(err: SurrealStoreError) -> Self {
        let operation = match &err {
            SurrealStoreError::ConnectionFailed { .. } => "connect",
            SurrealStoreError::SchemaError { .. } => "initialize_schema",
            _ => "query",
        };
        err.into_core(operation)
    }
}

/// Result type for durable store operations.
pub type SurrealResult<T> = Result<T, SurrealStoreError>;

/// Helper to convert SurrealDB errors to `SurrealStoreError`.
pub fn from_surrealdb_error(err: impl fmt::Display) -> SurrealStoreError {
    let msg = err.to_string();

    if msg.contains("can be retried") || msg.contains("conflict") {
        SurrealStoreError::WriteConflict { reason: msg }
    } else if msg.contains("connection") || msg.contains("Connection") || msg.contains("connect") {
        SurrealStoreError::connection_failed(msg)
    } else {
        SurrealStoreError::query_failed(msg)
    }
}
