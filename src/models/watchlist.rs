use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

// ==============================================================================
// Watchlist Models
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub ticker: String,
    pub name: String,
}

impl WatchlistEntry {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self { ticker: ticker.into(), name: name.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWatchlistEntryRequest {
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWatchlistEntriesRequest {
    pub entries: Vec<AddWatchlistEntryRequest>,
}

// ==============================================================================
// Ticker normalization
// ==============================================================================

fn ticker_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9][0-9A-Z]{3,5}$").ok()).as_ref()
}

/// Canonical exchange code: trimmed, upper-cased, without `.TW` / `.TWO`.
pub fn normalize_ticker(raw: &str) -> Result<String, AppError> {
    let upper = raw.trim().to_uppercase();
    let code = upper
        .strip_suffix(".TWO")
        .or_else(|| upper.strip_suffix(".TW"))
        .unwrap_or(&upper);

    if ticker_pattern().is_some_and(|re| re.is_match(code)) {
        Ok(code.to_string())
    } else {
        Err(AppError::Validation(format!("invalid ticker '{}'", raw.trim())))
    }
}
