#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # idem
//!
//! Server wiring for the idempotency engine: configuration, store selection
//! and the demo API.

pub mod app;
pub mod cli;
pub mod config;

pub use app::{OpenedStore, open_store, router};
pub use cli::Cli;
pub use config::{AppConfig, Backend, ConfigError, ServerConfig, StoreConfig};
