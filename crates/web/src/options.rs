//! Middleware options and their serde configuration section.

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderName, StatusCode};
use serde::Deserialize;

use crate::error::WebError;

/// Default request header carrying the idempotency key.
pub const DEFAULT_HEADER_NAME: &str = "x-idempotency-key";

/// Default body of the conflict response.
pub const DEFAULT_CONFLICT_MESSAGE: &str =
    "Request is already in progress or conflicts with previous payload.";

/// Default request and captured response body limit (1MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;

/// Which fingerprint strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintKind {
    /// Hex SHA-256 of the request body
    #[default]
    BodySha256,
    /// Every payload counts as the same request
    Constant,
}

/// The `[web]` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub header_name: String,
    pub conflict_status: u16,
    pub conflict_message: String,
    /// Response headers replayed alongside the body
    pub headers_to_store: Vec<String>,
    /// Trusted header carrying the caller identity; empty means anonymous
    pub actor_header: String,
    pub fingerprint: FingerprintKind,
    pub max_body_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            conflict_status: StatusCode::CONFLICT.as_u16(),
            conflict_message: DEFAULT_CONFLICT_MESSAGE.to_string(),
            headers_to_store: vec!["cache-control".to_string(), "content-encoding".to_string()],
            actor_header: String::new(),
            fingerprint: FingerprintKind::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Decides whether a handler's status is worth replaying.
pub type RetainPredicate = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Runtime options of the idempotency middleware.
#[derive(Clone)]
pub struct IdempotencyOptions {
    pub header_name: HeaderName,
    pub conflict_status: StatusCode,
    pub conflict_message: String,
    /// Completed when true, released otherwise. Defaults to 2xx.
    pub retain: RetainPredicate,
    pub headers_to_store: Vec<HeaderName>,
    pub max_body_bytes: usize,
}

impl fmt::Debug for IdempotencyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyOptions")
            .field("header_name", &self.header_name)
            .field("conflict_status", &self.conflict_status)
            .field("conflict_message", &self.conflict_message)
            .field("headers_to_store", &self.headers_to_store)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for IdempotencyOptions {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static(DEFAULT_HEADER_NAME),
            conflict_status: StatusCode::CONFLICT,
            conflict_message: DEFAULT_CONFLICT_MESSAGE.to_string(),
            retain: Arc::new(|status: StatusCode| status.is_success()),
            headers_to_store: vec![
                HeaderName::from_static("cache-control"),
                HeaderName::from_static("content-encoding"),
            ],
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl IdempotencyOptions {
    /// Build options from the configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::InvalidConfig`] for an unparsable header name, an
    /// out-of-range conflict status or a zero body limit.
    pub fn from_config(config: &WebConfig) -> Result<Self, WebError> {
        let header_name = parse_header_name(&config.header_name)?;
        let conflict_status = StatusCode::from_u16(config.conflict_status).map_err(|_| {
            WebError::invalid_config(format!("invalid conflict status {}", config.conflict_status))
        })?;
        if config.max_body_bytes == 0 {
            return Err(WebError::invalid_config("max_body_bytes must be positive"));
        }

        let headers_to_store = config
            .headers_to_store
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(parse_header_name)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            header_name,
            conflict_status,
            conflict_message: config.conflict_message.clone(),
            headers_to_store,
            max_body_bytes: config.max_body_bytes,
            ..Self::default()
        })
    }

    /// Replace the retain predicate.
    #[must_use]
    pub fn with_retain(mut self, retain: impl Fn(StatusCode) -> bool + Send + Sync + 'static) -> Self {
        self.retain = Arc::new(retain);
        self
    }

    #[must_use]
    pub fn with_headers_to_store(mut self, headers: impl IntoIterator<Item = HeaderName>) -> Self {
        self.headers_to_store = headers.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Whether a response with `status` should be stored for replay.
    #[must_use]
    pub fn should_retain(&self, status: StatusCode) -> bool {
        (self.retain)(status)
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, WebError> {
    HeaderName::try_from(name.trim())
        .map_err(|_| WebError::invalid_config(format!("invalid header name '{name}'")))
}
