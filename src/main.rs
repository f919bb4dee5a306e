//! # idem - idempotent request server
//!
//! ## Startup
//!
//! 1. **Configuration** - Load the TOML file (or defaults) and validate it
//! 2. **Store** - Open the in-memory or SurrealDB backend
//! 3. **Sweeper** - Start periodic deletion of expired records
//! 4. **Axum API** - Serve the demo routes behind the idempotency middleware
//!
//! ## Shutdown
//!
//! SIGINT or SIGTERM stops accepting connections, drains in-flight requests
//! and then stops the sweeper.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use idem::{AppConfig, Cli, open_store, router};
use idem_core::spawn_expiry_sweeper;

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    init_tracing(&cli.log_level);

    let config = AppConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let addr = match cli.bind {
        Some(addr) => addr,
        None => config.bind_addr()?,
    };

    let opened = open_store(&config.store)
        .await
        .context("Store initialization failed")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_expiry_sweeper(opened.purger, config.store.sweep_interval(), shutdown_rx);

    let app = router(opened.service, &config)?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(
        %addr,
        startup_ms = start_time.elapsed().as_millis(),
        "idem listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    info!("Stopping expiry sweeper");
    // A send error only means the sweeper already exited.
    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper.await {
        error!("Expiry sweeper ended abnormally: {}", err);
    }

    info!("idem stopped gracefully");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` wins over `--log-level`.
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(err) => error!("Failed to listen for Ctrl+C: {}", err),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
