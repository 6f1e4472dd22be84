use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{InstitutionalFlowRecord, MarketQuote, PriceBar, Valuation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Yahoo,
    FinMind,
    Twse,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Yahoo => "yahoo",
            DataSource::FinMind => "fin_mind",
            DataSource::Twse => "twse",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yahoo" => Ok(DataSource::Yahoo),
            "finmind" | "fin_mind" => Ok(DataSource::FinMind),
            "twse" => Ok(DataSource::Twse),
            other => Err(format!("unknown data source '{}'", other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("not found")]
    NotFound,

    #[error("capability not offered by this provider")]
    Unsupported,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Parse(e.to_string())
        } else if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            ProviderError::RateLimited
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Map a non-2xx status to the error the fallback chain understands.
pub fn status_error(status: reqwest::StatusCode, what: &str) -> ProviderError {
    match status {
        reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        reqwest::StatusCode::NOT_FOUND => ProviderError::NotFound,
        other => ProviderError::BadResponse(format!("{} returned HTTP {}", what, other)),
    }
}

/// A market-data vendor. Each method is one capability; vendors override the
/// ones they actually offer.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn source(&self) -> DataSource;

    /// Daily bars in ascending date order, `start..=end`.
    async fn fetch_daily_bars(
        &self,
        _ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn fetch_institutional_flows(
        &self,
        _ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<InstitutionalFlowRecord>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    /// Ordinary shares issued. `Ok(None)` when the vendor has no figure.
    async fn fetch_shares_outstanding(&self, _ticker: &str) -> Result<Option<f64>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn fetch_market_quotes(&self) -> Result<Vec<MarketQuote>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    async fn fetch_valuations(&self) -> Result<Vec<Valuation>, ProviderError> {
        Err(ProviderError::Unsupported)
    }

    /// Drop any data the provider keeps between requests.
    fn clear_caches(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_parses_config_spellings() {
        assert_eq!("Yahoo".parse::<DataSource>().unwrap(), DataSource::Yahoo);
        assert_eq!("finmind".parse::<DataSource>().unwrap(), DataSource::FinMind);
        assert_eq!(" twse ".parse::<DataSource>().unwrap(), DataSource::Twse);
        assert!("bloomberg".parse::<DataSource>().is_err());
    }

    #[test]
    fn status_error_maps_rate_limit_and_not_found() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "x"),
            ProviderError::RateLimited
        ));
        assert!(matches!(status_error(reqwest::StatusCode::NOT_FOUND, "x"), ProviderError::NotFound));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY, "x"),
            ProviderError::BadResponse(_)
        ));
    }
}
