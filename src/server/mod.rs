//! HTTP API server.

pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::inference::InferenceService;

use state::AppState;

/// Build the application router around a constructed inference service.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(routes::predict::predict))
        .route("/batch_predict", post(routes::predict::batch_predict))
        .route("/classes", get(routes::classes::list_classes))
        .route("/health", get(routes::health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Start serving until the process is stopped.
pub async fn serve(config: AppConfig) -> Result<()> {
    let service = InferenceService::from_config(&config)?;
    let state = Arc::new(AppState::new(service, &config.api));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address: {e}")))?;
    info!("Starting server on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
