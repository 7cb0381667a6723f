//! The log-stream supervisor binary.
//!
//! Parses configuration, opens the filter manager core, mounts its HTTP
//! surface, and serves until `SIGINT`/`SIGTERM`, at which point background
//! tickers stop and the KV handle closes in order (spec §4.7).

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use lsd_core::{FilterManager, ManagerConfig};
use lsd_http::HttpConfig;
use tracing_subscriber::EnvFilter;

use crate::config::Args;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    // Opening the KV store is the one failure in this whole stack that is
    // fatal at startup (spec §7); every other `lsd_core::Error` is a
    // per-request failure handled by the HTTP layer.
    let manager_config = ManagerConfig {
        db_path: args.db_file.clone(),
        max_msg_memory: args.max_msg_memory,
        persist_queue_depth: args.persist_queue_depth,
    };
    let manager = Arc::new(
        FilterManager::open(manager_config)
            .wrap_err_with(|| format!("failed to open filter database at {:?}", args.db_file))?,
    );

    let router = lsd_http::router(manager, HttpConfig::default());

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(bind = %args.bind, db_file = ?args.db_file, "lsd-supervisor listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("HTTP server exited with an error")?;

    tracing::info!("lsd-supervisor shut down");
    Ok(())
}

/// Resolves on `SIGINT` (Ctrl-C) or, on unix, `SIGTERM` — whichever comes
/// first triggers axum's graceful shutdown, which stops accepting new
/// connections and lets the `FilterManager` (dropped when `main` returns)
/// stop its background threads and close the KV handle.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
