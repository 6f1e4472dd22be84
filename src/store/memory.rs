use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::WatchlistEntry;
use crate::store::{StoreError, WatchlistStore};

/// Process-local watchlist, lost on restart.
#[derive(Default)]
pub struct MemoryWatchlistStore {
    entries: RwLock<Vec<WatchlistEntry>>,
}

impl MemoryWatchlistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<WatchlistEntry>) -> Self {
        Self { entries: RwLock::new(entries) }
    }
}

#[async_trait]
impl WatchlistStore for MemoryWatchlistStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn read(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        Ok(self.entries.read().clone())
    }

    async fn write(&self, entries: &[WatchlistEntry]) -> Result<(), StoreError> {
        *self.entries.write() = entries.to_vec();
        Ok(())
    }
}
