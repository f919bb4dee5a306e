//! Idempotency coordination engine.
//!
//! Guarantees at-most-one logical execution of an operation identified by a
//! client-supplied key, and replays the stored result to repeats.
//!
//! - **Value types**: [`IdempotencyKey`], [`RequestFingerprint`], [`IdempotencyData`]
//! - **Store contract**: [`IdempotencyStore`] with atomic claim, complete, release
//! - **Decision maker**: [`decide`], a total function over claim outcomes
//! - **Service**: [`IdempotencyService`], the only source of `Execute`
//! - **Cancellation**: [`CancelSignal`] threaded through every operation
//! - **Drop safety**: [`IdempotencyService::decide_detached`] and [`ReleaseGuard`]
//!   free a slot whose owner was dropped mid-flight
//!
//! # Example
//!
//! ```ignore
//! use idem_core::{
//!     CancelSignal, IdempotencyData, IdempotencyDecision, IdempotencyRequest,
//!     IdempotencyService, InMemoryStore, RequestFingerprint,
//! };
//!
//! let service = IdempotencyService::from_store(InMemoryStore::new());
//! let cancel = CancelSignal::never();
//! let request = IdempotencyRequest::from_parts("u1", "orders", "abc", RequestFingerprint::new("f1"))?;
//!
//! match service.decide(&request, &cancel).await? {
//!     IdempotencyDecision::Execute => {
//!         let data = IdempotencyData::new().with("status-code", "201");
//!         service.complete(&request, &data, &cancel).await?;
//!     }
//!     IdempotencyDecision::Replay(data) => println!("replaying {data:?}"),
//!     IdempotencyDecision::Reject(_) => println!("conflict"),
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cancel;
pub mod decision;
pub mod error;
pub mod guard;
pub mod memory;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod types;

pub use cancel::{CancelHandle, CancelSignal};
pub use decision::{DecisionKind, IdempotencyClaim, IdempotencyDecision, RejectReason, decide};
pub use error::{Error, Result};
pub use guard::ReleaseGuard;
pub use memory::InMemoryStore;
pub use service::IdempotencyService;
pub use store::{IdempotencyStore, TracingStore};
pub use sweeper::{PurgeExpired, spawn_expiry_sweeper};
pub use types::{
    IdempotencyData, IdempotencyKey, IdempotencyRequest, IdempotencyStatus, RequestFingerprint,
};
