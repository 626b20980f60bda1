//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::backend::backend_name;
use crate::model::ModelInfo;
use crate::server::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub backend: String,
    /// True once a trained checkpoint has been applied; false means the
    /// service is up but answering with untrained weights.
    pub model_loaded: bool,
    pub model: ModelInfo,
}

/// GET /health - service liveness plus model metadata.
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let service = state.service();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        backend: backend_name().to_string(),
        model_loaded: service.checkpoint_loaded(),
        model: service.model_info().clone(),
    })
}
