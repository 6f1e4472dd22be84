use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::{normalize_ticker, FlowHistoryResponse, KdSeriesResponse, StockSnapshot};
use crate::routes::watchlist::RefreshParams;
use crate::state::AppState;

/// Upper bound for `days` on chart endpoints.
const MAX_DAYS: u32 = 730;
const MAX_KD_PERIOD: usize = 120;
const DEFAULT_FLOW_DAYS: u32 = 30;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:ticker/snapshot", get(get_snapshot))
        .route("/:ticker/kd", get(get_kd_series))
        .route("/:ticker/flows", get(get_flow_history))
}

#[derive(Debug, Deserialize)]
pub struct KdParams {
    pub period: Option<usize>,
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct FlowParams {
    pub days: Option<u32>,
}

fn check_days(days: u32) -> Result<u32, AppError> {
    if days == 0 || days > MAX_DAYS {
        return Err(AppError::Validation(format!("days must be between 1 and {}", MAX_DAYS)));
    }
    Ok(days)
}

pub async fn get_snapshot(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<StockSnapshot>, AppError> {
    info!("GET /api/stocks/{}/snapshot - Building snapshot", ticker);
    let ticker = normalize_ticker(&ticker)?;

    if params.refresh {
        state.dashboard.refresh(&ticker);
    }

    Ok(Json(state.dashboard.snapshot(&ticker, None).await))
}

pub async fn get_kd_series(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<KdParams>,
) -> Result<Json<KdSeriesResponse>, AppError> {
    info!("GET /api/stocks/{}/kd - Getting KD series", ticker);
    let ticker = normalize_ticker(&ticker)?;

    let period = params.period.unwrap_or(state.config.kd_period);
    if period == 0 || period > MAX_KD_PERIOD {
        return Err(AppError::Validation(format!("period must be between 1 and {}", MAX_KD_PERIOD)));
    }
    let days = check_days(params.days.unwrap_or(state.config.history_lookback_days))?;

    Ok(Json(state.dashboard.kd_series(&ticker, period, days).await))
}

pub async fn get_flow_history(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<FlowParams>,
) -> Result<Json<FlowHistoryResponse>, AppError> {
    info!("GET /api/stocks/{}/flows - Getting institutional flows", ticker);
    let ticker = normalize_ticker(&ticker)?;
    let days = check_days(params.days.unwrap_or(DEFAULT_FLOW_DAYS))?;

    Ok(Json(state.dashboard.flow_history(&ticker, days).await))
}
