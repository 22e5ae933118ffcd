//! Huddle HTTP Surface
//!
//! HTTP layer for Huddle, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws?session=<key>&token=<jwt>` - Join a collaboration session
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Session and connection counts
//!
//! # Example
//!
//! ```rust,ignore
//! use huddle::api::{serve, AppState};
//! use huddle::config::Config;
//! use huddle::identity::{InMemoryUserDirectory, JwtIdentityResolver, TokenVerifier};
//! use huddle::session::SessionRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let verifier = Arc::new(TokenVerifier::new(
//!         config.auth.jwt_secret.as_bytes(),
//!         chrono::Duration::hours(config.auth.token_ttl_hours),
//!     ));
//!     let resolver = JwtIdentityResolver::new(verifier, Arc::new(InMemoryUserDirectory::new()));
//!     let registry = Arc::new(SessionRegistry::new(config.hub.clone()));
//!
//!     serve(AppState::new(registry, Arc::new(resolver)), &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Huddle listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Huddle shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
