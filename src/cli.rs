//! CLI definition using clap.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Idempotent request coordination server
#[derive(Parser, Debug)]
#[command(name = "idem")]
#[command(version)]
#[command(about = "HTTP server that executes each idempotency key at most once")]
#[command(
    long_about = "Serves a demo API behind the idempotency middleware. Retries carrying the same key replay the first response; conflicting payloads are rejected."
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "IDEM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding `[server] bind`
    #[arg(short, long, env = "IDEM_BIND")]
    pub bind: Option<SocketAddr>,

    /// Log filter used when RUST_LOG is unset (e.g. "info", "idem_core=debug")
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
