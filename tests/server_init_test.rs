//! Integration tests for server initialization and the assembled router.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio::time::{Duration, timeout};
use tower::ServiceExt;

use idem::{AppConfig, Backend, open_store, router};
use idem_core::PurgeExpired;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type TestResult = Result<(), BoxError>;

fn post_json(uri: &str, key: Option<&str>, body: &str) -> Result<Request<Body>, axum::http::Error> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    let builder = match key {
        Some(key) => builder.header("x-idempotency-key", key),
        None => builder,
    };
    builder.body(Body::from(body.to_string()))
}

async fn body_json(response: axum::response::Response) -> Result<serde_json::Value, BoxError> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

async fn memory_app() -> Result<axum::Router, BoxError> {
    let config = AppConfig::default();
    let opened = open_store(&config.store).await?;
    Ok(router(opened.service, &config)?)
}

#[tokio::test]
async fn test_retried_order_is_created_once() -> TestResult {
    let app = memory_app().await?;
    let order = r#"{"item":"widget","quantity":2}"#;

    let first = app.clone().oneshot(post_json("/orders", Some("order-1"), order)?).await?;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await?;

    let retry = app.clone().oneshot(post_json("/orders", Some("order-1"), order)?).await?;
    assert_eq!(retry.status(), StatusCode::CREATED);
    assert_eq!(body_json(retry).await?, first);

    let fresh = app.oneshot(post_json("/orders", Some("order-2"), order)?).await?;
    let fresh = body_json(fresh).await?;
    assert_ne!(fresh["id"], first["id"], "a new key creates a new order");
    Ok(())
}

#[tokio::test]
async fn test_conflicting_payload_is_rejected() -> TestResult {
    let app = memory_app().await?;

    app.clone()
        .oneshot(post_json("/orders", Some("k"), r#"{"item":"a","quantity":1}"#)?)
        .await?;
    let conflict = app
        .oneshot(post_json("/orders", Some("k"), r#"{"item":"b","quantity":1}"#)?)
        .await?;
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn test_rejected_order_frees_key() -> TestResult {
    let app = memory_app().await?;

    let invalid = app
        .clone()
        .oneshot(post_json("/orders", Some("k"), r#"{"item":"a","quantity":0}"#)?)
        .await?;
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let corrected = app
        .oneshot(post_json("/orders", Some("k"), r#"{"item":"a","quantity":1}"#)?)
        .await?;
    assert_eq!(corrected.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn test_health_is_not_guarded() -> TestResult {
    let app = memory_app().await?;
    for _ in 0..2 {
        let request = Request::builder()
            .uri("/health")
            .header("x-idempotency-key", "same")
            .body(Body::empty())?;
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }
    Ok(())
}

#[tokio::test]
async fn test_surreal_backend_starts() -> TestResult {
    let mut config = AppConfig::default();
    config.store.backend = Backend::Surreal;
    config.validate()?;

    let opened = timeout(Duration::from_secs(10), open_store(&config.store)).await??;
    let app = router(opened.service, &config)?;

    let payment = r#"{"amount_cents":1250}"#;
    let first = app.clone().oneshot(post_json("/payments", Some("p-1"), payment)?).await?;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await?;

    let retry = app.oneshot(post_json("/payments", Some("p-1"), payment)?).await?;
    assert_eq!(body_json(retry).await?, first);

    assert_eq!(opened.purger.purge_expired().await?, 0);
    Ok(())
}
