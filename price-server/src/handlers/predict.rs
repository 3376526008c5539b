//! Prediction handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use price_core::{PredictionRequest, PredictionResponse};

use crate::{AppResult, AppState};

/// Run the pipeline on tokio's blocking pool; attribution and chart
/// rendering are CPU-bound.
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> AppResult<Json<PredictionResponse>> {
    let Json(request) = payload?;
    tracing::debug!(city = %request.city, property_type = %request.property_type, "Prediction requested");

    let pipeline = state.pipeline.clone();
    let response = tokio::task::spawn_blocking(move || pipeline.predict(&request)).await??;

    Ok(Json(response))
}
