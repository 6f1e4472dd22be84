use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::watchlist::normalize_ticker;
use crate::models::{AddWatchlistEntryRequest, WatchlistEntry};
use crate::services::market_data_service::MarketDataService;
use crate::store::WatchlistStore;

/// Upper bound on entries accepted in one add request.
pub const MAX_ENTRIES_PER_REQUEST: usize = 200;

/// Merge `incoming` into `existing`.
///
/// Existing order is kept. An incoming ticker already in the list replaces
/// that entry in place; a ticker repeated within `incoming` resolves to its
/// last occurrence. New tickers are appended in first-seen order.
pub fn merge_entries(existing: &[WatchlistEntry], incoming: &[WatchlistEntry]) -> Vec<WatchlistEntry> {
    let mut merged: Vec<WatchlistEntry> = Vec::with_capacity(existing.len() + incoming.len());

    for entry in existing.iter().chain(incoming) {
        match merged.iter_mut().find(|e| e.ticker == entry.ticker) {
            Some(slot) => *slot = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }

    merged
}

/// Canonical tickers for entries read back from a store.
///
/// Stored rows may carry `.TW` suffixes or repeat a ticker; they are
/// normalized and de-duplicated with the last row winning. Rows whose ticker
/// cannot be normalized are kept as written so they are not silently dropped.
pub fn canonicalize_stored(stored: Vec<WatchlistEntry>) -> Vec<WatchlistEntry> {
    let normalized: Vec<WatchlistEntry> = stored
        .into_iter()
        .map(|entry| match normalize_ticker(&entry.ticker) {
            Ok(ticker) => WatchlistEntry { ticker, ..entry },
            Err(_) => {
                warn!("Keeping unrecognized stored ticker '{}' as written", entry.ticker);
                entry
            }
        })
        .collect();

    merge_entries(&[], &normalized)
}

/// Watchlist reads and read-modify-write cycles against the configured store.
pub struct WatchlistService {
    store: Arc<dyn WatchlistStore>,
    market: Arc<MarketDataService>,
    write_lock: Mutex<()>,
}

impl WatchlistService {
    pub fn new(store: Arc<dyn WatchlistStore>, market: Arc<MarketDataService>) -> Self {
        Self { store, market, write_lock: Mutex::new(()) }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn list(&self) -> Result<Vec<WatchlistEntry>, AppError> {
        let entries = self.store.read().await.map_err(|e| {
            warn!("Failed to read watchlist from {}: {}", self.store.backend(), e);
            AppError::from(e)
        })?;
        Ok(canonicalize_stored(entries))
    }

    /// Add or update entries and return the stored list.
    pub async fn add(&self, requests: Vec<AddWatchlistEntryRequest>) -> Result<Vec<WatchlistEntry>, AppError> {
        if requests.is_empty() {
            return Err(AppError::Validation("at least one entry is required".to_string()));
        }
        if requests.len() > MAX_ENTRIES_PER_REQUEST {
            return Err(AppError::Validation(format!(
                "at most {} entries per request",
                MAX_ENTRIES_PER_REQUEST
            )));
        }

        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            let ticker = normalize_ticker(&request.ticker)?;
            let name = request.name.map(|n| n.trim().to_string()).unwrap_or_default();
            pending.push(WatchlistEntry::new(ticker, name));
        }

        let _guard = self.write_lock.lock().await;
        let existing = self.list().await?;

        let mut incoming = Vec::with_capacity(pending.len());
        for mut entry in pending {
            if entry.name.is_empty() {
                entry.name = self.resolve_name(&entry.ticker, &existing).await;
            }
            incoming.push(entry);
        }

        let merged = merge_entries(&existing, &incoming);
        self.store.write(&merged).await?;

        info!(
            "Watchlist now has {} entries ({} submitted) in {}",
            merged.len(),
            incoming.len(),
            self.store.backend()
        );
        Ok(merged)
    }

    /// Remove one ticker and return the stored list.
    pub async fn remove(&self, raw_ticker: &str) -> Result<Vec<WatchlistEntry>, AppError> {
        let ticker = normalize_ticker(raw_ticker)?;

        let _guard = self.write_lock.lock().await;
        let mut entries = self.list().await?;
        let before = entries.len();
        entries.retain(|e| e.ticker != ticker);

        if entries.len() == before {
            return Err(AppError::NotFound(format!("{} is not on the watchlist", ticker)));
        }

        self.store.write(&entries).await?;
        info!("Removed {} from the watchlist", ticker);
        Ok(entries)
    }

    /// Name for an entry submitted without one: the stored name, then the
    /// exchange listing, then the ticker itself.
    async fn resolve_name(&self, ticker: &str, existing: &[WatchlistEntry]) -> String {
        if let Some(known) = existing.iter().find(|e| e.ticker == ticker && !e.name.is_empty()) {
            return known.name.clone();
        }
        self.market
            .lookup_name(ticker)
            .await
            .unwrap_or_else(|| ticker.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticker: &str, name: &str) -> WatchlistEntry {
        WatchlistEntry::new(ticker, name)
    }

    #[test]
    fn merge_appends_new_tickers_in_order() {
        let existing = vec![entry("2330", "台積電")];
        let incoming = vec![entry("2317", "鴻海"), entry("2603", "長榮")];

        let merged = merge_entries(&existing, &incoming);
        let tickers: Vec<&str> = merged.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["2330", "2317", "2603"]);
    }

    #[test]
    fn merge_replaces_duplicates_in_place() {
        let existing = vec![entry("2330", "TSMC"), entry("2317", "鴻海")];
        let incoming = vec![entry("2330", "台積電")];

        let merged = merge_entries(&existing, &incoming);
        assert_eq!(merged, vec![entry("2330", "台積電"), entry("2317", "鴻海")]);
    }

    #[test]
    fn stored_suffixes_are_normalized_and_deduplicated() {
        let stored = vec![
            entry("2330.TW", "TSMC"),
            entry("2317", "鴻海"),
            entry(" 2330 ", "台積電"),
            entry("n/a", "note"),
        ];

        let canonical = canonicalize_stored(stored);
        assert_eq!(
            canonical,
            vec![entry("2330", "台積電"), entry("2317", "鴻海"), entry("n/a", "note")]
        );
    }

    #[test]
    fn merge_last_occurrence_wins_within_request() {
        let incoming = vec![entry("2603", "first"), entry("2317", "鴻海"), entry("2603", "長榮")];

        let merged = merge_entries(&[], &incoming);
        assert_eq!(merged, vec![entry("2603", "長榮"), entry("2317", "鴻海")]);
    }
}
