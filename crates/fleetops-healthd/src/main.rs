//! # FleetOps Health Service
//!
//! Binary entry point for the Redis health endpoint service. Acts as the
//! composition root for the shared connection provider: the provider is
//! constructed once here, shared by reference with the handlers, and torn
//! down after the HTTP server drains.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetops_redis::RedisProvider;

/// Service configuration
#[derive(Debug, Clone)]
struct Config {
    /// Server bind address
    server_addr: SocketAddr,

    /// Logging level
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self {
            server_addr: std::env::var("SERVER_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
                .parse()
                .expect("Invalid SERVER_ADDR"),

            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

/// Shared state for the health handlers
#[derive(Clone)]
struct AppState {
    redis: Arc<RedisProvider>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        version = fleetops_redis::VERSION,
        "Starting FleetOps health service"
    );

    // Composition root: one provider per process, shared by reference.
    // The connection itself is established on first use.
    let redis = Arc::new(RedisProvider::from_env());

    let state = AppState {
        redis: Arc::clone(&redis),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = config.server_addr;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the shared connection after in-flight requests drained
    redis.shutdown().await;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Liveness probe
async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: verifies the shared Redis connection answers commands
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = match state.redis.get_client().await {
        Ok(handle) => handle.ping().await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready" })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": err.to_string(),
            })),
        ),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
