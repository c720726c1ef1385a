use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod adapters;
mod config;
mod error_log;
mod handlers;
mod heartbeat;
mod models;
mod transport;
mod utils;

use config::GatewayConfig;
use error_log::ErrorLog;
use handlers::{push_router, AppState};
use heartbeat::Heartbeat;
use transport::Transport;

#[derive(Debug, Parser)]
#[command(name = "push-gateway", version)]
struct Args {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
    #[arg(long, default_value = "data/config.json")]
    config: String,
    #[arg(long, default_value = "data/error.log")]
    error_log: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let error_log = Arc::new(ErrorLog::new(&args.error_log));
    error_log.mark_startup().await;
    tracing::info!("error log: {}", error_log.path().display());

    let config = GatewayConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    let config = Arc::new(config);

    let transport = Transport::new().context("failed to build HTTP client")?;
    let shutdown = CancellationToken::new();

    let heartbeat = match Heartbeat::new(&config.heartbeat_url, config.heartbeat_interval) {
        Some(heartbeat) => {
            tracing::info!(
                "heartbeat enabled: {} (every {}s)",
                heartbeat.url(),
                heartbeat.interval().as_secs()
            );
            Some(heartbeat.spawn(transport.clone(), shutdown.clone()))
        }
        None => {
            tracing::info!("heartbeat not configured");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        transport,
        error_log,
    };

    let app = push_router()
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!("listening on {}", args.bind);
    log_routes(&config, &args.bind);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if let Some(heartbeat) = heartbeat {
        if let Err(err) = heartbeat.await {
            tracing::error!("heartbeat task failed: {}", err);
        }
    }
    served.context("server error")
}

fn log_routes(config: &GatewayConfig, bind: &str) {
    if let Some(prefix) = config.route_prefix() {
        tracing::info!("route prefix: /{}", prefix);
    }
    tracing::info!("configured routes:");
    for route in config.routes() {
        tracing::info!(
            "  - http://{}/{}/ (type: {})",
            bind,
            config.route_path(&route.name),
            route.kind
        );
        if route.platform().is_none() {
            tracing::warn!("route '{}' declares unsupported type '{}'", route.name, route.kind);
        }
    }
    tracing::info!("usage: GET or POST with msg=<message> [title=<title>]");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C signal, shutting down gracefully");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM signal, shutting down gracefully");
        },
    }
}
