//! reqdesk-ai - request clustering and response fan-out service
//!
//! Accepts constituent requests, tags them through the oracle, clusters
//! similar public requests into groups on a timer, and fans staff group
//! responses out to every member as personalized replies.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use reqdesk_common::config::{resolve_root_folder, ServiceConfig, ENV_ROOT_FOLDER};
use reqdesk_common::events::EventBus;

use reqdesk_ai::oracle::ChatCompletionClient;
use reqdesk_ai::services::{spawn_clustering_timer, spawn_limiter_sweep, SubmissionRateLimiter};
use reqdesk_ai::AppState;

/// Command-line arguments for reqdesk-ai
#[derive(Parser, Debug)]
#[command(name = "reqdesk-ai")]
#[command(about = "Request clustering and response fan-out service")]
#[command(version)]
struct Args {
    /// Root folder holding the database (else REQDESK_ROOT_FOLDER, config file, default)
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Configuration file (defaults to the platform config location)
    #[arg(short, long, env = "REQDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long, env = "REQDESK_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reqdesk_ai=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    info!(
        "Starting reqdesk-ai {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config = ServiceConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    config.validate()?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ENV_ROOT_FOLDER);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let db_pool = reqdesk_ai::db::init_database_pool(&db_path).await?;

    let oracle = ChatCompletionClient::from_config(&config.oracle)
        .context("Failed to initialize oracle client")?;
    info!(endpoint = %oracle.endpoint(), model = %config.oracle.model, "Oracle client ready");

    let limiter = SubmissionRateLimiter::new(
        config.submission_limit.max_requests,
        std::time::Duration::from_secs(config.submission_limit.window_secs),
    )?;

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, event_bus, Arc::new(oracle), limiter);

    let cancel = CancellationToken::new();
    let timer = spawn_clustering_timer(
        state.clustering.clone(),
        reqdesk_common::time::secs_to_duration(config.clustering_interval_secs),
        cancel.clone(),
    );
    let sweep = spawn_limiter_sweep(
        state.submission_limiter.clone(),
        reqdesk_common::time::secs_to_duration(config.submission_limit.window_secs),
        cancel.clone(),
    );

    let tasks = state.tasks.clone();
    let app = reqdesk_ai::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    cancel.cancel();
    timer.await.ok();
    sweep.await.ok();
    tasks.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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
