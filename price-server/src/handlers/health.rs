//! Health check handler

use axum::{extract::State, Json};
use price_core::features::LayoutInfo;
use price_core::model::ModelInfo;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    model: ModelInfo,
    layout: LayoutInfo,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        model: state.pipeline.model().info(),
        layout: LayoutInfo::current(),
    })
}
