use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{AddWatchlistEntriesRequest, WatchlistEntry, WatchlistSnapshotResponse};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_entries).post(add_entries))
        .route("/snapshots", get(get_snapshots))
        .route("/:ticker", delete(remove_entry))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub refresh: bool,
}

pub async fn list_entries(State(state): State<AppState>) -> Result<Json<Vec<WatchlistEntry>>, AppError> {
    info!("GET /api/watchlist - Listing watchlist ({})", state.watchlist.backend());

    let entries = state.watchlist.list().await.map_err(|e| {
        error!("Failed to read watchlist: {}", e);
        e
    })?;

    Ok(Json(entries))
}

pub async fn add_entries(
    State(state): State<AppState>,
    Json(payload): Json<AddWatchlistEntriesRequest>,
) -> Result<Json<Vec<WatchlistEntry>>, AppError> {
    info!("POST /api/watchlist - Adding {} entries", payload.entries.len());

    let entries = state.watchlist.add(payload.entries).await.map_err(|e| {
        error!("Failed to add watchlist entries: {}", e);
        e
    })?;

    Ok(Json(entries))
}

pub async fn remove_entry(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WatchlistEntry>>, AppError> {
    info!("DELETE /api/watchlist/{} - Removing entry", ticker);

    let entries = state.watchlist.remove(&ticker).await.map_err(|e| {
        error!("Failed to remove {} from watchlist: {}", ticker, e);
        e
    })?;

    Ok(Json(entries))
}

pub async fn get_snapshots(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<WatchlistSnapshotResponse>, AppError> {
    info!("GET /api/watchlist/snapshots - Building snapshots (refresh={})", params.refresh);

    let entries = state.watchlist.list().await.map_err(|e| {
        error!("Failed to read watchlist: {}", e);
        e
    })?;

    if params.refresh {
        for entry in &entries {
            state.dashboard.refresh(&entry.ticker);
        }
    }

    Ok(Json(state.dashboard.watchlist_snapshots(&entries).await))
}
