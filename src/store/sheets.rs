use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::external::google_sheets::{SheetValues, SheetsError};
use crate::models::WatchlistEntry;
use crate::store::{entries_from_rows, rows_from_entries, StoreError, WatchlistStore};

/// Watchlist kept in one tab of a Google spreadsheet.
///
/// Columns are found by header, so users may reorder them or add their own;
/// a rewrite keeps only the ticker and name columns.
pub struct SheetsWatchlistStore {
    client: Arc<dyn SheetValues>,
    sheet_name: String,
}

impl SheetsWatchlistStore {
    pub fn new(client: Arc<dyn SheetValues>, sheet_name: impl Into<String>) -> Self {
        Self { client, sheet_name: sheet_name.into() }
    }

    /// A1 range covering the whole tab; quoted for names with spaces or CJK.
    fn range(&self) -> String {
        format!("'{}'", self.sheet_name.replace('\'', "''"))
    }

    fn range_of(&self, cells: &str) -> String {
        format!("{}!{}", self.range(), cells)
    }
}

impl From<SheetsError> for StoreError {
    fn from(e: SheetsError) -> Self {
        if e.is_retryable() {
            StoreError::Unavailable(e.to_string())
        } else {
            match e {
                SheetsError::Payload(msg) => StoreError::Corrupt(msg),
                other => StoreError::Config(other.to_string()),
            }
        }
    }
}

#[async_trait]
impl WatchlistStore for SheetsWatchlistStore {
    fn backend(&self) -> &'static str {
        "sheets"
    }

    async fn read(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        let rows = self.client.get_values(&self.range()).await?;
        Ok(entries_from_rows(&rows))
    }

    /// Overwrite from the top, then clear what lies outside the new list.
    ///
    /// A failure part way leaves the previous list or a superset of it.
    async fn write(&self, entries: &[WatchlistEntry]) -> Result<(), StoreError> {
        let rows = rows_from_entries(entries);
        let row_count = rows.len();

        self.client.update(&self.range_of("A1"), rows).await?;
        self.client.clear(&self.range_of(&format!("A{}:Z", row_count + 1))).await?;
        self.client.clear(&self.range_of(&format!("C1:Z{}", row_count))).await?;
        info!("Synced {} watchlist entries to sheet {}", entries.len(), self.sheet_name);
        Ok(())
    }
}
