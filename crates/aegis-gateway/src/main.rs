//! # Aegis - out-of-band anti-bot verification gateway
//!
//! Sits beside a front HTTP proxy (NGINX `auth_request`) and decides, for
//! each proxied transaction: allow, deny, or serve a verification challenge.
//!
//! ## Architecture
//! ```text
//! Client → NGINX ──auth sub-request──► Aegis ──204/403/302──► NGINX
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aegis_common::constants::{DEFAULT_CONFIG_PATH, SHUTDOWN_GRACE_SECS};
use aegis_gateway::config::AppConfig;
use aegis_gateway::state::AppState;
use aegis_gateway::{routes, server, workers};

/// Aegis verification gateway
#[derive(Parser, Debug)]
#[command(name = "aegis")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config)?;
    init_logging(&config.logger.level, args.json_logs);

    info!("Starting Aegis v{}", env!("CARGO_PKG_VERSION"));
    let state = AppState::new(config.clone())?;

    // Root shutdown signal shared by the server and the background loops
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    tokio::spawn(workers::sweep_worker(
        state.verifier.clone(),
        shutdown_tx.subscribe(),
    ));
    if state.verifier.reloads_templates() {
        tokio::spawn(workers::reload_worker(
            state.verifier.clone(),
            shutdown_tx.subscribe(),
        ));
    }
    tokio::spawn(workers::rotation_worker(
        state.limiter.clone(),
        shutdown_tx.subscribe(),
    ));

    let app = routes::create_router(state);
    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to listen on {}", config.address))?;
    info!("Aegis listening on {}", config.address);

    let mut server = tokio::spawn(server::serve(listener, app, shutdown_tx.subscribe()));

    tokio::select! {
        result = &mut server => {
            // The server ended on its own; stop the background loops too
            let _ = shutdown_tx.send(());
            result.context("server task failed")?.context("server error")?;
            error!("Server stopped unexpectedly");
            anyhow::bail!("server stopped unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Shutting down server");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), server).await {
                Ok(result) => {
                    result.context("server task failed")?.context("server shutdown error")?;
                }
                Err(_) => {
                    anyhow::bail!("server did not drain within {} seconds", SHUTDOWN_GRACE_SECS);
                }
            }
        }
    }

    info!("Aegis shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) {
    let level = match level.to_ascii_uppercase().as_str() {
        "ERROR" => "error",
        "WARNING" => "warn",
        "DEBUG" => "debug",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
