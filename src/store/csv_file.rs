use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::models::WatchlistEntry;
use crate::store::{entries_from_rows, rows_from_entries, StoreError, WatchlistStore};

/// Watchlist kept in a local CSV file with a `股票代號,名稱` header.
pub struct CsvWatchlistStore {
    path: PathBuf,
}

impl CsvWatchlistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::PermissionDenied => {
            StoreError::Config(format!("{}: {}", path.display(), e))
        }
        _ => StoreError::Unavailable(format!("{}: {}", path.display(), e)),
    }
}

fn read_rows(path: &Path) -> Result<Vec<Vec<String>>, StoreError> {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            return match e.into_kind() {
                csv::ErrorKind::Io(io) if io.kind() == ErrorKind::NotFound => {
                    debug!("No watchlist file at {}; starting empty", path.display());
                    Ok(Vec::new())
                }
                csv::ErrorKind::Io(io) => Err(io_error(path, io)),
                other => Err(StoreError::Corrupt(format!("{}: {:?}", path.display(), other))),
            };
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        // Spreadsheet exports often start with a byte order mark
        if let Some(first) = cells.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }
        rows.push(cells);
    }
    Ok(rows)
}

fn write_rows(path: &Path, rows: &[Vec<String>]) -> Result<(), StoreError> {
    let tmp = path.with_extension("csv.tmp");

    {
        let mut writer = csv::Writer::from_path(&tmp)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", tmp.display(), e)))?;
        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", tmp.display(), e)))?;
        }
        writer.flush().map_err(|e| io_error(&tmp, e))?;
    }

    // Rename is atomic on the same filesystem, so readers never see half a file
    std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

#[async_trait]
impl WatchlistStore for CsvWatchlistStore {
    fn backend(&self) -> &'static str {
        "csv"
    }

    async fn read(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| StoreError::Unavailable(format!("watchlist read task failed: {}", e)))??;
        Ok(entries_from_rows(&rows))
    }

    async fn write(&self, entries: &[WatchlistEntry]) -> Result<(), StoreError> {
        let path = self.path.clone();
        let rows = rows_from_entries(entries);
        let count = entries.len();

        tokio::task::spawn_blocking(move || write_rows(&path, &rows))
            .await
            .map_err(|e| StoreError::Unavailable(format!("watchlist write task failed: {}", e)))??;

        info!("Saved {} watchlist entries to {}", count, self.path.display());
        Ok(())
    }
}
