#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tower::ServiceExt;

use taiwatch::app::create_app;
use taiwatch::config::AppConfig;
use taiwatch::external::multi_provider::{MultiProvider, ProviderChains, SharedProvider};
use taiwatch::external::provider::{DataSource, MarketDataProvider, ProviderError};
use taiwatch::models::{CategoryMap, InstitutionalFlowRecord, MarketQuote, PriceBar, Valuation, WatchlistEntry};
use taiwatch::state::AppState;
use taiwatch::store::{MemoryWatchlistStore, StoreError, WatchlistStore};

pub fn day(i: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap() + Duration::days(i)
}

/// `n` bars rising by 1 per day from 100, volume 1 000 lots except the last
/// bar which trades twice that.
pub fn rising_bars(n: usize) -> Vec<PriceBar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64;
            let volume = if i + 1 == n { 2_000_000.0 } else { 1_000_000.0 };
            PriceBar::new(day(i as i64), close - 0.5, close + 1.0, close - 1.0, close, volume)
        })
        .collect()
}

pub fn flow(d: i64, label: &str, buy: f64, sell: f64) -> InstitutionalFlowRecord {
    InstitutionalFlowRecord {
        date: day(d),
        category_label: label.to_string(),
        buy_quantity: buy,
        sell_quantity: sell,
    }
}

pub fn quote(ticker: &str, name: &str, close: f64, change: f64, volume: f64) -> MarketQuote {
    MarketQuote {
        ticker: ticker.to_string(),
        name: name.to_string(),
        date: Some(day(29)),
        open: Some(close - change),
        high: Some(close),
        low: Some(close - change),
        close: Some(close),
        change: Some(change),
        volume,
        trade_value: None,
    }
}

/// Canned vendor answers keyed by ticker. Unknown tickers read as empty.
#[derive(Default)]
pub struct FakeProvider {
    pub bars: HashMap<String, Vec<PriceBar>>,
    pub flows: HashMap<String, Vec<InstitutionalFlowRecord>>,
    pub shares: HashMap<String, f64>,
    pub quotes: Vec<MarketQuote>,
    pub valuations: Vec<Valuation>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn failing() -> Self {
        Self { fail: true, ..Default::default() }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn guard(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ProviderError::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn source(&self) -> DataSource {
        DataSource::Twse
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        self.guard()?;
        Ok(self.bars.get(ticker).cloned().unwrap_or_default())
    }

    async fn fetch_institutional_flows(
        &self,
        ticker: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<InstitutionalFlowRecord>, ProviderError> {
        self.guard()?;
        Ok(self.flows.get(ticker).cloned().unwrap_or_default())
    }

    async fn fetch_shares_outstanding(&self, ticker: &str) -> Result<Option<f64>, ProviderError> {
        self.guard()?;
        Ok(self.shares.get(ticker).copied())
    }

    async fn fetch_market_quotes(&self) -> Result<Vec<MarketQuote>, ProviderError> {
        self.guard()?;
        Ok(self.quotes.clone())
    }

    async fn fetch_valuations(&self) -> Result<Vec<Valuation>, ProviderError> {
        self.guard()?;
        Ok(self.valuations.clone())
    }
}

/// A store whose backend is always down.
pub struct DownStore;

#[async_trait]
impl WatchlistStore for DownStore {
    fn backend(&self) -> &'static str {
        "down"
    }

    async fn read(&self) -> Result<Vec<WatchlistEntry>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    async fn write(&self, _entries: &[WatchlistEntry]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }
}

/// Provider with two stocks: 2330 (30 rising bars, flows, shares) and 2317
/// (flat, no flows).
pub fn sample_provider() -> FakeProvider {
    let mut provider = FakeProvider::default();
    provider.bars.insert("2330".to_string(), rising_bars(30));
    provider.bars.insert("2317".to_string(), rising_bars(30));
    provider.flows.insert(
        "2330".to_string(),
        vec![
            flow(28, "Foreign_Investor", 9_000_000.0, 1_000_000.0),
            flow(29, "Foreign_Investor", 5_000_000.0, 2_000_000.0),
            flow(29, "Investment_Trust", 500_000.0, 1_500_000.0),
            flow(29, "Dealer_self", 100_000.0, 0.0),
        ],
    );
    provider.shares.insert("2330".to_string(), 100_000_000.0);
    provider.quotes = vec![
        quote("2330", "台積電", 129.0, 6.0, 20_000_000.0),
        quote("2317", "鴻海", 129.0, 1.0, 10_000_000.0),
        quote("0050", "元大台灣50", 180.0, 9.0, 5_000_000.0),
        quote("2603", "長榮", 200.0, -4.0, 8_000_000.0),
    ];
    provider.valuations = vec![
        Valuation {
            ticker: "2330".to_string(),
            name: "台積電".to_string(),
            pe_ratio: Some(25.0),
            dividend_yield: Some(1.5),
            pb_ratio: Some(6.0),
        },
        Valuation {
            ticker: "2317".to_string(),
            name: "鴻海".to_string(),
            pe_ratio: Some(12.0),
            dividend_yield: Some(4.0),
            pb_ratio: Some(1.4),
        },
    ];
    provider
}

pub fn chains(provider: Arc<FakeProvider>) -> ProviderChains {
    let shared: SharedProvider = provider;
    ProviderChains {
        bars: vec![shared.clone()],
        flows: vec![shared.clone()],
        shares: vec![shared.clone()],
        market: vec![shared],
    }
}

pub fn build_app(provider: Arc<FakeProvider>, store: Arc<dyn WatchlistStore>) -> Router {
    let state = AppState::from_parts(
        AppConfig::default(),
        MultiProvider::new(chains(provider)),
        store,
        CategoryMap::builtin(),
    );
    create_app(state)
}

pub fn memory_app(provider: Arc<FakeProvider>) -> Router {
    build_app(provider, Arc::new(MemoryWatchlistStore::new()))
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

pub async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
