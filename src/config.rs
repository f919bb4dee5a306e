//! Server configuration loaded from TOML.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:3000"
//!
//! [store]
//! backend = "surreal"          # or "memory"
//! ttl_secs = 1800
//! sweep_interval_secs = 60
//!
//! [store.surreal]
//! url = "rocksdb://data/idem"
//! namespace = "idempotency"
//! database = "default"
//!
//! [web]
//! header_name = "x-idempotency-key"
//! conflict_status = 409
//! headers_to_store = ["cache-control", "content-encoding"]
//! actor_header = "x-user-id"
//! fingerprint = "body_sha256"
//! ```
//!
//! Every key is optional.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use idem_surreal::SurrealStoreConfig;
use idem_web::{IdempotencyOptions, WebConfig};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Which store holds idempotency records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Memory,
    Surreal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Record lifetime, measured from the claim
    pub ttl_secs: u64,
    /// Period of the expired-record sweeper
    pub sweep_interval_secs: u64,
    pub surreal: SurrealStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            ttl_secs: 1800,
            sweep_interval_secs: 60,
            surreal: SurrealStoreConfig::default(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// The durable store settings with the configured TTL applied.
    #[must_use]
    pub fn surreal_config(&self) -> SurrealStoreConfig {
        self.surreal.clone().with_ttl(self.ttl())
    }
}

impl AppConfig {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        if self.store.ttl_secs == 0 {
            return Err(ConfigError::invalid("store.ttl_secs must be greater than zero"));
        }
        if self.store.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "store.sweep_interval_secs must be greater than zero",
            ));
        }
        if self.store.backend == Backend::Surreal {
            self.store
                .surreal_config()
                .validate()
                .map_err(|err| ConfigError::invalid(err.to_string()))?;
        }

        IdempotencyOptions::from_config(&self.web)
            .map_err(|err| ConfigError::invalid(err.to_string()))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `server.bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|_| {
            ConfigError::invalid(format!("server.bind '{}' is not a socket address", self.server.bind))
        })
    }
}
