//! Connection settings for the durable store.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{SurrealResult, SurrealStoreError};

/// Default record lifetime: 30 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Configuration for the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SurrealStoreConfig {
    /// Connection URL (e.g., "mem://", "rocksdb://data/idem", "ws://localhost:8000")
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Table holding one record per idempotency key
    pub table: String,
    /// Optional root credentials
    pub username: Option<String>,
    pub password: Option<String>,
    /// Lifetime of a record, measured from its claim
    #[serde(skip)]
    pub ttl: Duration,
    /// How many times a claim hitting a write conflict is re-run
    pub conflict_retries: u32,
}

impl SurrealStoreConfig {
    /// Create an in-memory configuration for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".to_string(),
            namespace: "idempotency".to_string(),
            database: "test".to_string(),
            table: "idempotency_records".to_string(),
            username: None,
            password: None,
            ttl: DEFAULT_TTL,
            conflict_retries: 3,
        }
    }

    /// Create an embedded RocksDB configuration.
    #[must_use]
    pub fn rocksdb(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("rocksdb://{}", path.as_ref()),
            database: "default".to_string(),
            ..Self::in_memory()
        }
    }

    /// Create a WebSocket configuration.
    #[must_use]
    pub fn websocket(host: &str, port: u16) -> Self {
        Self {
            url: format!("ws://{host}:{port}"),
            database: "default".to_string(),
            ..Self::in_memory()
        }
    }

    /// Set credentials for authentication.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Root credentials, if both halves are present.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .zip(self.password.as_deref())
    }

    /// Validate the configuration before connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is not a plain identifier, the TTL
    /// is zero, or only one credential half is set.
    pub fn validate(&self) -> SurrealResult<()> {
        validate_table_name(&self.table)?;
        if self.ttl.is_zero() {
            return Err(SurrealStoreError::invalid_config("ttl must be positive"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(SurrealStoreError::invalid_config(
                "username and password must be set together",
            ));
        }
        if self.namespace.trim().is_empty() || self.database.trim().is_empty() {
            return Err(SurrealStoreError::invalid_config(
                "namespace and database must not be empty",
            ));
        }
        Ok(())
    }
}

impl Default for SurrealStoreConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            ..Self::in_memory()
        }
    }
}

/// Table names are spliced into DDL, so only `[A-Za-z_][A-Za-z0-9_]*` passes.
///
/// # Errors
///
/// Returns [`SurrealStoreError::InvalidTableName`] otherwise.
pub fn validate_table_name(table: &str) -> SurrealResult<()> {
    let mut chars = table.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_head && valid_tail {
        Ok(())
    } else {
        Err(SurrealStoreError::invalid_table_name(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_in_memory() {
        let config = SurrealStoreConfig::in_memory();
        assert_eq!(config.url, "mem://");
        assert_eq!(config.namespace, "idempotency");
        assert_eq!(config.table, "idempotency_records");
        assert_eq!(config.ttl, DEFAULT_TTL);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_store_config_websocket() {
        let config = SurrealStoreConfig::websocket("localhost", 8000);
        assert_eq!(config.url, "ws://localhost:8000");
        assert_eq!(config.database, "default");
    }

    #[test]
    fn test_store_config_with_credentials() {
        let config = SurrealStoreConfig::in_memory().with_credentials("root", "secret");
        assert_eq!(config.credentials(), Some(("root", "secret")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let mut config = SurrealStoreConfig::in_memory();
        config.username = Some("root".to_string());
        assert!(matches!(
            config.validate(),
            Err(SurrealStoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = SurrealStoreConfig::in_memory().with_ttl(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("idempotency_records").is_ok());
        assert!(validate_table_name("_t1").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("records; REMOVE TABLE x").is_err());
        assert!(validate_table_name("a-b").is_err());
    }
}
