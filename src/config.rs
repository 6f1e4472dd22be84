use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::external::provider::DataSource;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set for the selected watchlist backend")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchlistBackend {
    Memory,
    Csv,
    Sheets,
    Postgres,
}

impl FromStr for WatchlistBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(WatchlistBackend::Memory),
            "csv" => Ok(WatchlistBackend::Csv),
            "sheets" | "google_sheets" => Ok(WatchlistBackend::Sheets),
            "postgres" | "postgresql" => Ok(WatchlistBackend::Postgres),
            other => Err(format!("unknown backend '{}', expected memory, csv, sheets or postgres", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,

    pub quote_providers: Vec<DataSource>,
    pub flow_providers: Vec<DataSource>,
    pub share_providers: Vec<DataSource>,
    pub finmind_api_token: Option<String>,
    pub twse_accept_invalid_certs: bool,
    pub http_timeout_secs: u64,
    pub provider_max_concurrent: usize,
    pub provider_requests_per_minute: u32,
    pub provider_jitter_ms: u64,

    pub quote_cache_ttl_secs: i64,
    pub reference_cache_ttl_secs: i64,
    pub failure_cache_ttl_secs: i64,

    pub history_lookback_days: u32,
    pub kd_period: usize,
    pub scan_max_candidates: usize,
    pub category_map_path: Option<PathBuf>,

    pub watchlist_backend: WatchlistBackend,
    pub watchlist_csv_path: PathBuf,
    pub sheets_spreadsheet_id: Option<String>,
    pub sheets_sheet_name: String,
    pub google_credentials_path: Option<PathBuf>,
    pub database_url: Option<String>,

    pub job_scheduler_enabled: bool,
    pub job_scheduler_test_mode: bool,
    pub watchlist_refresh_cron: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            quote_providers: vec![DataSource::Yahoo, DataSource::FinMind],
            flow_providers: vec![DataSource::FinMind, DataSource::Twse],
            share_providers: vec![DataSource::Twse, DataSource::FinMind],
            finmind_api_token: None,
            twse_accept_invalid_certs: false,
            http_timeout_secs: 15,
            provider_max_concurrent: 2,
            provider_requests_per_minute: 30,
            provider_jitter_ms: 500,
            quote_cache_ttl_secs: 600,
            reference_cache_ttl_secs: 3600,
            failure_cache_ttl_secs: 120,
            history_lookback_days: 120,
            kd_period: 9,
            scan_max_candidates: 30,
            category_map_path: None,
            watchlist_backend: WatchlistBackend::Memory,
            watchlist_csv_path: PathBuf::from("watchlist.csv"),
            sheets_spreadsheet_id: None,
            sheets_sheet_name: "watchlist".to_string(),
            google_credentials_path: None,
            database_url: None,
            job_scheduler_enabled: true,
            job_scheduler_test_mode: false,
            watchlist_refresh_cron: "0 */10 1-5 * * Mon-Fri".to_string(),
        }
    }
}

fn parse_value<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) if !value.trim().is_empty() => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

fn parse_sources(
    key: &'static str,
    raw: Option<String>,
    default: Vec<DataSource>,
) -> Result<Vec<DataSource>, ConfigError> {
    let Some(value) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };

    let mut sources = Vec::new();
    for part in value.split(',').filter(|p| !p.trim().is_empty()) {
        let source: DataSource = part.parse().map_err(|reason| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason,
        })?;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    Ok(sources)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();

        let config = Self {
            bind_addr: non_empty(lookup("BIND_ADDR")).unwrap_or(d.bind_addr),
            quote_providers: parse_sources("QUOTE_PROVIDERS", lookup("QUOTE_PROVIDERS"), d.quote_providers)?,
            flow_providers: parse_sources("FLOW_PROVIDERS", lookup("FLOW_PROVIDERS"), d.flow_providers)?,
            share_providers: parse_sources("SHARE_PROVIDERS", lookup("SHARE_PROVIDERS"), d.share_providers)?,
            finmind_api_token: non_empty(lookup("FINMIND_API_TOKEN")),
            twse_accept_invalid_certs: parse_value(
                "TWSE_ACCEPT_INVALID_CERTS",
                lookup("TWSE_ACCEPT_INVALID_CERTS"),
                d.twse_accept_invalid_certs,
            )?,
            http_timeout_secs: parse_value("HTTP_TIMEOUT_SECS", lookup("HTTP_TIMEOUT_SECS"), d.http_timeout_secs)?,
            provider_max_concurrent: parse_value(
                "PROVIDER_MAX_CONCURRENT",
                lookup("PROVIDER_MAX_CONCURRENT"),
                d.provider_max_concurrent,
            )?,
            provider_requests_per_minute: parse_value(
                "PROVIDER_REQUESTS_PER_MINUTE",
                lookup("PROVIDER_REQUESTS_PER_MINUTE"),
                d.provider_requests_per_minute,
            )?,
            provider_jitter_ms: parse_value("PROVIDER_JITTER_MS", lookup("PROVIDER_JITTER_MS"), d.provider_jitter_ms)?,
            quote_cache_ttl_secs: parse_value(
                "QUOTE_CACHE_TTL_SECS",
                lookup("QUOTE_CACHE_TTL_SECS"),
                d.quote_cache_ttl_secs,
            )?,
            reference_cache_ttl_secs: parse_value(
                "REFERENCE_CACHE_TTL_SECS",
                lookup("REFERENCE_CACHE_TTL_SECS"),
                d.reference_cache_ttl_secs,
            )?,
            failure_cache_ttl_secs: parse_value(
                "FAILURE_CACHE_TTL_SECS",
                lookup("FAILURE_CACHE_TTL_SECS"),
                d.failure_cache_ttl_secs,
            )?,
            history_lookback_days: parse_value(
                "HISTORY_LOOKBACK_DAYS",
                lookup("HISTORY_LOOKBACK_DAYS"),
                d.history_lookback_days,
            )?,
            kd_period: parse_value("KD_PERIOD", lookup("KD_PERIOD"), d.kd_period)?,
            scan_max_candidates: parse_value(
                "SCAN_MAX_CANDIDATES",
                lookup("SCAN_MAX_CANDIDATES"),
                d.scan_max_candidates,
            )?,
            category_map_path: non_empty(lookup("INSTITUTIONAL_CATEGORY_MAP")).map(PathBuf::from),
            watchlist_backend: parse_value("WATCHLIST_BACKEND", lookup("WATCHLIST_BACKEND"), d.watchlist_backend)?,
            watchlist_csv_path: non_empty(lookup("WATCHLIST_CSV_PATH"))
                .map(PathBuf::from)
                .unwrap_or(d.watchlist_csv_path),
            sheets_spreadsheet_id: non_empty(lookup("GOOGLE_SHEETS_SPREADSHEET_ID")),
            sheets_sheet_name: non_empty(lookup("GOOGLE_SHEETS_SHEET_NAME")).unwrap_or(d.sheets_sheet_name),
            google_credentials_path: non_empty(lookup("GOOGLE_APPLICATION_CREDENTIALS")).map(PathBuf::from),
            database_url: non_empty(lookup("DATABASE_URL")),
            job_scheduler_enabled: parse_value(
                "JOB_SCHEDULER_ENABLED",
                lookup("JOB_SCHEDULER_ENABLED"),
                d.job_scheduler_enabled,
            )?,
            job_scheduler_test_mode: parse_value(
                "JOB_SCHEDULER_TEST_MODE",
                lookup("JOB_SCHEDULER_TEST_MODE"),
                d.job_scheduler_test_mode,
            )?,
            watchlist_refresh_cron: non_empty(lookup("WATCHLIST_REFRESH_CRON")).unwrap_or(d.watchlist_refresh_cron),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid { key, value: "0".to_string(), reason: "must be positive".to_string() })
            } else {
                Ok(())
            }
        };
        positive("HTTP_TIMEOUT_SECS", self.http_timeout_secs)?;
        positive("PROVIDER_MAX_CONCURRENT", self.provider_max_concurrent as u64)?;
        positive("PROVIDER_REQUESTS_PER_MINUTE", self.provider_requests_per_minute as u64)?;
        positive("HISTORY_LOOKBACK_DAYS", self.history_lookback_days as u64)?;
        positive("KD_PERIOD", self.kd_period as u64)?;

        for (key, ttl) in [
            ("QUOTE_CACHE_TTL_SECS", self.quote_cache_ttl_secs),
            ("REFERENCE_CACHE_TTL_SECS", self.reference_cache_ttl_secs),
            ("FAILURE_CACHE_TTL_SECS", self.failure_cache_ttl_secs),
        ] {
            if ttl < 0 {
                return Err(ConfigError::Invalid { key, value: ttl.to_string(), reason: "must not be negative".to_string() });
            }
        }

        match self.watchlist_backend {
            WatchlistBackend::Sheets => {
                if self.sheets_spreadsheet_id.is_none() {
                    return Err(ConfigError::Missing("GOOGLE_SHEETS_SPREADSHEET_ID"));
                }
                if self.google_credentials_path.is_none() {
                    return Err(ConfigError::Missing("GOOGLE_APPLICATION_CREDENTIALS"));
                }
            }
            WatchlistBackend::Postgres if self.database_url.is_none() => {
                return Err(ConfigError::Missing("DATABASE_URL"));
            }
            _ => {}
        }

        Ok(())
    }
}
