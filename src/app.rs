//! Store selection and router assembly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use idem_core::{IdempotencyService, InMemoryStore, PurgeExpired, TracingStore};
use idem_surreal::SurrealStore;
use idem_web::{IdempotencyState, idempotency_middleware};

use crate::config::{AppConfig, Backend, StoreConfig};

/// An opened store: the engine facade plus a handle for the expiry sweeper.
pub struct OpenedStore {
    pub service: IdempotencyService,
    pub purger: Arc<dyn PurgeExpired>,
}

/// Open the configured backend.
///
/// # Errors
///
/// Returns an error if the durable store cannot connect or define its schema.
pub async fn open_store(config: &StoreConfig) -> Result<OpenedStore> {
    match config.backend {
        Backend::Memory => {
            let store = Arc::new(InMemoryStore::with_ttl(config.ttl()));
            info!(ttl_secs = config.ttl_secs, "Using in-memory idempotency store");
            Ok(OpenedStore {
                service: IdempotencyService::new(Arc::new(TracingStore::new(store.clone()))),
                purger: store,
            })
        }
        Backend::Surreal => {
            let surreal = config.surreal_config();
            let store = SurrealStore::open(surreal.clone())
                .await
                .with_context(|| format!("Failed to open SurrealDB store at {}", surreal.url))?;
            store
                .health_check()
                .await
                .context("SurrealDB health check failed")?;
            info!(url = %surreal.url, table = %surreal.table, "Using SurrealDB idempotency store");

            let store = Arc::new(store);
            Ok(OpenedStore {
                service: IdempotencyService::new(Arc::new(TracingStore::new(store.clone()))),
                purger: store,
            })
        }
    }
}

/// Build the demo API behind the idempotency middleware.
///
/// # Errors
///
/// Returns an error if the `[web]` section does not produce valid options.
pub fn router(service: IdempotencyService, config: &AppConfig) -> Result<Router> {
    let state = IdempotencyState::from_config(service, &config.web)
        .context("Invalid [web] configuration")?;

    let orders = Arc::new(OrderBook::default());
    Ok(Router::new()
        .route(
            "/orders",
            post(move |Json(order): Json<NewOrder>| create_order(orders.clone(), order)),
        )
        .route(
            "/payments",
            post(|Json(payment): Json<NewPayment>| take_payment(payment)),
        )
        .layer(middleware::from_fn_with_state(state, idempotency_middleware))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http()))
}

#[derive(Debug, Default)]
struct OrderBook {
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct NewOrder {
    item: String,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct NewPayment {
    amount_cents: u64,
}

async fn create_order(orders: Arc<OrderBook>, order: NewOrder) -> impl IntoResponse {
    if order.quantity == 0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "quantity must be positive" })),
        );
    }
    let id = orders.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    info!(order_id = id, item = %order.item, "Order created");
    (
        StatusCode::CREATED,
        Json(json!({ "id": id, "item": order.item, "quantity": order.quantity })),
    )
}

async fn take_payment(payment: NewPayment) -> impl IntoResponse {
    if payment.amount_cents == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "amount must be positive" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({ "status": "captured", "amount_cents": payment.amount_cents })),
    )
}
