//! HTTP-facing errors of the idempotency middleware.
//!
//! Store failures become a bare `503 Service Unavailable`; internals are only
//! logged, never sent to the client.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors the middleware can turn into a response.
#[derive(Debug, Error)]
pub enum WebError {
    /// The engine or its store failed
    #[error(transparent)]
    Store(#[from] idem_core::Error),

    /// The request body exceeded the configured buffer limit
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The request body stream failed
    #[error("failed to read request body: {reason}")]
    RequestBody { reason: String },

    /// The handler's response body stream failed
    #[error("failed to read response body: {reason}")]
    ResponseBody { reason: String },

    /// Options could not be built from configuration
    #[error("invalid web configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl WebError {
    /// Create a request body error.
    pub fn request_body(reason: impl Into<String>) -> Self {
        Self::RequestBody {
            reason: reason.into(),
        }
    }

    /// Create a response body error.
    pub fn response_body(reason: impl Into<String>) -> Self {
        Self::ResponseBody {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Status code sent to the client.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestBody { .. } => StatusCode::BAD_REQUEST,
            Self::ResponseBody { .. } | Self::InvalidConfig { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Store(err) => {
                tracing::error!(error = %err, retryable = err.is_retryable(), "Idempotency store failure");
                status.into_response()
            }
            Self::ResponseBody { .. } | Self::InvalidConfig { .. } => {
                tracing::error!(error = %self, "Idempotency middleware failure");
                status.into_response()
            }
            Self::PayloadTooLarge { .. } | Self::RequestBody { .. } => {
                tracing::debug!(error = %self, "Rejected idempotent request body");
                (
                    status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    self.to_string(),
                )
                    .into_response()
            }
        }
    }
}
