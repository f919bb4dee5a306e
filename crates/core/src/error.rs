//! Core error types for idempotency coordination.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.
//! A fingerprint mismatch or an inconsistent record is *not* an error: both
//! surface as a reject decision.

use thiserror::Error;

/// Result type alias for idempotency operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while coordinating idempotent execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The backing store could not be reached or failed mid-operation.
    #[error("idempotency store unavailable during '{operation}': {reason}")]
    StoreUnavailable { operation: String, reason: String },

    /// The caller cancelled the operation before it settled.
    #[error("idempotency operation '{operation}' was cancelled")]
    Cancelled { operation: String },

    /// An idempotency key component was missing or blank.
    #[error("invalid idempotency key: {reason}")]
    InvalidKey { reason: String },

    /// Configuration was rejected during validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a store unavailable error.
    pub fn store_unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the operation ended because of cancellation rather than failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether a caller may reasonably retry.
    ///
    /// The engine never retries on its own; this is advice for the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
