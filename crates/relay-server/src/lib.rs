//! Direct Message Relay Server Library
//!
//! Routes 1:1 messages between connected users, tracks presence, relays
//! typing indicators and read receipts.

pub mod chat;
pub mod config;
pub mod ctx;
pub mod error;
pub mod handlers;
pub mod models;
pub mod protocol;
pub mod store;

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{AppState, ServerConfig};

/// Full HTTP application for the given state
pub fn app(state: AppState) -> Router {
    let api = handlers::router().route_layer(middleware::from_fn(ctx::mw_require_identity));

    Router::new()
        .merge(api)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }

    info!("=== Relay Server ===");

    let config = ServerConfig::default();
    config.ensure_dirs().await?;
    info!("Data directory: {:?}", config.data_dir);

    let store = config.open_store().await?;
    let port = config.port;
    let state = AppState::new(config, store);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Relay server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Relay Server"
}
