//! axum adapter for the idempotency engine.
//!
//! Extracts the key header, resolves actor and scope, fingerprints the body,
//! and turns engine decisions into responses: replays, conflicts, or a
//! handler run whose result is captured for later replays.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::post};
//! use idem_core::{IdempotencyService, InMemoryStore};
//! use idem_web::{IdempotencyOptions, IdempotencyState, idempotency_middleware};
//!
//! let service = IdempotencyService::from_store(InMemoryStore::new());
//! let state = IdempotencyState::new(service, IdempotencyOptions::default());
//!
//! let app = Router::new()
//!     .route("/orders", post(create_order))
//!     .layer(middleware::from_fn_with_state(state, idempotency_middleware));
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod fingerprint;
pub mod middleware;
pub mod options;
pub mod resolve;
pub mod snapshot;

pub use error::WebError;
pub use fingerprint::{BodySha256, ConstantFingerprint, Fingerprinter, fingerprinter_for};
pub use middleware::{IdempotencyState, idempotency_middleware};
pub use options::{FingerprintKind, IdempotencyOptions, RetainPredicate, WebConfig};
pub use resolve::{ActorResolver, AnonymousActor, FixedScope, HeaderActor, PathScope, ScopeResolver};
