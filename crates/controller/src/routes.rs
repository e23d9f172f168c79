//! Health and metrics listener.

use crate::metrics::metrics_handler;
use crate::state::CtrlState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health - metadata backend connectivity.
pub async fn health_check(State(state): State<CtrlState>) -> (StatusCode, Json<HealthResponse>) {
    let backend = state.backend.kind().to_string();
    match state.backend.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version: env!("CARGO_PKG_VERSION"),
                backend,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    version: env!("CARGO_PKG_VERSION"),
                    backend,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub fn create_router(state: CtrlState) -> Router {
    let mut router = Router::new().route("/health", get(health_check));

    // Unauthenticated; restrict to the scraper's network.
    if state.config.controller.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
