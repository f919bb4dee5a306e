//! Durable idempotency store on SurrealDB.
//!
//! Records expire after a configurable TTL (30 minutes by default). Expired
//! records behave as absent immediately; [`spawn_expiry_sweeper`] deletes
//! them in the background.
//!
//! # Example
//!
//! ```ignore
//! use idem_surreal::{SurrealStore, SurrealStoreConfig};
//! use idem_core::IdempotencyService;
//!
//! let store = SurrealStore::open(SurrealStoreConfig::rocksdb("data/idem")).await?;
//! let service = IdempotencyService::from_store(store);
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod store;

pub use config::{DEFAULT_TTL, SurrealStoreConfig, validate_table_name};
pub use error::{SurrealResult, SurrealStoreError, from_surrealdb_error};
pub use idem_core::{PurgeExpired, spawn_expiry_sweeper};
pub use store::SurrealStore;
