//! qb-moderator - Quote board moderator
//!
//! Follows one or more tracker collections, parses quote submissions and
//! writes verdicts back to the tracker. Optionally serves `/health` and
//! `/status` on the configured port.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qb_common::config::{load_config, resolve_config_path};
use qb_moderator::orchestrator::{Moderator, ModeratorSettings};
use qb_moderator::tracker::HttpTracker;
use qb_moderator::{AppState, CollectionHandle};

/// Command-line arguments for qb-moderator
#[derive(Parser, Debug)]
#[command(name = "qb-moderator")]
#[command(about = "Moderates quote submissions in a task tracker")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "QUOTEBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Scan every collection once, then exit
    #[arg(long)]
    scan_only: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())
        .context("Failed to locate configuration")?;
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "qb_moderator={0},qb_common={0},tower_http=info",
                    config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting qb-moderator v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_path.display());

    let tracker = Arc::new(
        HttpTracker::new(&config.tracker).context("Failed to create tracker client")?,
    );
    let settings = ModeratorSettings::from_config(&config);

    let moderators: Vec<_> = config
        .collections
        .iter()
        .map(|collection| {
            Moderator::new(Arc::clone(&tracker), settings.clone(), collection.clone())
        })
        .collect();
    info!("Moderating {} collection(s)", moderators.len());

    if args.scan_only {
        for moderator in &moderators {
            let summary = moderator
                .initial_scan()
                .await
                .with_context(|| format!("Scan of {} failed", moderator.collection_id()))?;
            info!(
                collection = %moderator.collection_id(),
                valid = summary.valid,
                invalid = summary.invalid,
                "Scan-only pass finished"
            );
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();

    if let Some(port) = config.status_port {
        let state = AppState::new(moderators.iter().map(CollectionHandle::for_moderator).collect());
        let app = qb_moderator::build_router(state);
        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Status endpoint on http://{}/status", addr);

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!("Status server error: {}", e);
            }
        });
    }

    let tasks: Vec<_> = moderators
        .into_iter()
        .map(|moderator| tokio::spawn(moderator.run(shutdown.clone())))
        .collect();

    shutdown_signal().await;
    shutdown.cancel();

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Moderator error: {}", e),
            Err(e) => error!("Moderator task failed: {}", e),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
