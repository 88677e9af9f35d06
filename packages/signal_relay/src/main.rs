use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
mod handlers;
mod metrics;
mod signaling;
mod ws;

use crate::config::{FileConfig, Profile, ServerConfig, SignalingConfig};
use crate::metrics::ServerMetrics;
use crate::signaling::SignalingHub;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "signal-relay")]
#[command(about = "WebSocket signaling relay for peer-to-peer connection setup")]
struct Cli {
    /// Path to a config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Named configuration preset
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone)]
pub(crate) struct AppState {
    /// Peer registry, rooms and dashboard feed
    pub hub: Arc<SignalingHub>,
    /// Server runtime configuration
    pub server_config: Arc<ServerConfig>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    pub fn new(server_config: ServerConfig, signaling_config: SignalingConfig) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let hub = Arc::new(SignalingHub::new(signaling_config, metrics.clone()));
        Self {
            hub,
            server_config: Arc::new(server_config),
            metrics,
        }
    }
}

pub(crate) fn app_router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(handlers::signaling_websocket_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/dashboard", get(handlers::dashboard_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "signal_relay=debug,tower_http=debug,info"
    } else {
        "signal_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = config::load_config(cli.config.as_deref(), cli.profile.as_ref())
        .extract()
        .context("Failed to load configuration")?;

    let mut server_config = ServerConfig::from_file(&file_config.server);
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    let signaling_config = SignalingConfig::from_file(&file_config.signaling);

    info!(
        default_room = %signaling_config.default_room,
        duplicate_peer_ids = ?signaling_config.duplicate_peer_ids,
        "Starting signaling relay"
    );

    let addr = server_config.bind_addr()?;
    let app = app_router(AppState::new(server_config, signaling_config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Signaling relay listening on http://{}", actual_addr);
    info!("  GET    /ws             - Signaling WebSocket");
    info!("  GET    /health         - Health summary");
    info!("  GET    /metrics        - Server metrics");
    info!("  GET    /api/dashboard  - Peer list and stats");

    // Create shutdown signal handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, stopping...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Signaling relay stopped");
    Ok(())
}
