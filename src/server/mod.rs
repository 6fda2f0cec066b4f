mod handlers;
mod state;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::location::FeedSource;
use crate::plugin::PluginConfig;

/// Longest a position request waits for a fix unless the caller asks otherwise.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub fn build_router(feed: FeedSource, config: PluginConfig) -> Router {
    let state = Arc::new(AppState {
        feed,
        config,
        default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
    });

    Router::new()
        .route("/api/position", get(handlers::position))
        .route("/api/providers/{id}/fix", post(handlers::publish_fix))
        .route("/api/providers/{id}/enabled", post(handlers::set_enabled))
        .route("/api/providers/{id}/status", post(handlers::set_status))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(host: &str, port: u16, feed: FeedSource, config: PluginConfig) {
    let app = build_router(feed, config);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: Cannot bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    eprintln!("  geofix listening on http://{} (mode: {})", addr, config.mode);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Server error: {}", e);
            std::process::exit(1);
        });
}
