use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::delete,
    Router,
};
use tracing::info;

use crate::errors::AppError;
use crate::models::normalize_ticker;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", delete(clear_all))
        .route("/:ticker", delete(clear_ticker))
}

pub async fn clear_all(State(state): State<AppState>) -> StatusCode {
    info!("DELETE /api/cache - Clearing all caches");
    state.market.clear_all();
    StatusCode::NO_CONTENT
}

pub async fn clear_ticker(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    info!("DELETE /api/cache/{} - Clearing cached data", ticker);
    let ticker = normalize_ticker(&ticker)?;
    state.market.invalidate_ticker(&ticker);
    Ok(StatusCode::NO_CONTENT)
}
