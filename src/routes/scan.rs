use axum::{extract::State, routing::post, Json, Router};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::{ScanCriteria, ScanResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(run_scan))
}

pub async fn run_scan(
    State(state): State<AppState>,
    Json(criteria): Json<ScanCriteria>,
) -> Result<Json<ScanResponse>, AppError> {
    info!("POST /api/scan - Scanning market with {:?}", criteria);

    criteria.validate().map_err(|e| {
        warn!("Rejected scan criteria: {}", e);
        AppError::Validation(e)
    })?;

    let response = state.screening.scan(&criteria).await;
    info!("📊 Scan matched {} of {} stocks", response.hits.len(), response.total_screened);

    Ok(Json(response))
}
