//! Watchlist persistence.
//!
//! Every backend stores the whole list and replaces it wholesale on write.

pub mod csv_file;
pub mod memory;
pub mod postgres;
pub mod sheets;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::WatchlistEntry;

pub use csv_file::CsvWatchlistStore;
pub use memory::MemoryWatchlistStore;
pub use postgres::PostgresWatchlistStore;
pub use sheets::SheetsWatchlistStore;

/// Column headers shared by the file and spreadsheet backends.
pub const TICKER_HEADER: &str = "股票代號";
pub const NAME_HEADER: &str = "名稱";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached; the operation may succeed later.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The stored data cannot be interpreted as a watchlist.
    #[error("stored watchlist is corrupt: {0}")]
    Corrupt(String),

    /// Credentials, permissions or paths are wrong; retrying will not help.
    #[error("storage misconfigured: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn read(&self) -> Result<Vec<WatchlistEntry>, StoreError>;

    /// Replace the stored list with `entries`, in order.
    async fn write(&self, entries: &[WatchlistEntry]) -> Result<(), StoreError>;
}

/// Locate the ticker and name columns in a header row.
///
/// Both the localized and the English header spellings are accepted. Returns
/// `None` when there is no ticker column.
pub fn locate_columns(header: &[String]) -> Option<(usize, Option<usize>)> {
    let find = |names: &[&str]| {
        header
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let ticker = find(&[TICKER_HEADER, "ticker", "code"])?;
    let name = find(&[NAME_HEADER, "name"]);
    Some((ticker, name))
}

/// Turn header-addressed rows into entries. Rows without a ticker are skipped.
pub fn entries_from_rows(rows: &[Vec<String>]) -> Vec<WatchlistEntry> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let Some((ticker_col, name_col)) = locate_columns(header) else {
        return Vec::new();
    };

    body.iter()
        .filter_map(|row| {
            let ticker = row.get(ticker_col)?.trim();
            if ticker.is_empty() {
                return None;
            }
            let name = name_col
                .and_then(|col| row.get(col))
                .map(|n| n.trim().to_string())
                .unwrap_or_default();
            Some(WatchlistEntry::new(ticker, name))
        })
        .collect()
}

/// Header plus one row per entry, in list order.
pub fn rows_from_entries(entries: &[WatchlistEntry]) -> Vec<Vec<String>> {
    std::iter::once(vec![TICKER_HEADER.to_string(), NAME_HEADER.to_string()])
        .chain(entries.iter().map(|e| vec![e.ticker.clone(), e.name.clone()]))
        .collect()
}
