//! Analysis API Routes
//!
//! JSON view of one analysis run, plus a liveness probe.

use analysis_core::{validate_symbol, AnalysisReport};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analysis/:symbol", get(get_analysis))
        .route("/health", get(health))
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<AnalysisReport>>, AppError> {
    let symbol = validate_symbol(&symbol)
        .map_err(|e| AppError::with_status(StatusCode::BAD_REQUEST, e))?;

    let report = state.orchestrator.analyze(&symbol).await;
    Ok(Json(ApiResponse::success(report)))
}

async fn health() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    }))
}
