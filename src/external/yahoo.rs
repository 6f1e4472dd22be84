use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::external::provider::{status_error, DataSource, MarketDataProvider, ProviderError};
use crate::models::PriceBar;
use crate::services::rate_limiter::RateLimiter;
use crate::utils::{taipei_date, taipei_offset};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart API - free, no API key.
///
/// Listed shares trade as `NNNN.TW`, OTC shares as `NNNN.TWO`; bare codes are
/// tried against both.
pub struct YahooFinanceProvider {
    client: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl YahooFinanceProvider {
    pub fn new(client: reqwest::Client, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client,
            base_url: CHART_URL.to_string(),
            limiter,
        }
    }

    fn symbol_candidates(ticker: &str) -> Vec<String> {
        let upper = ticker.trim().to_uppercase();
        if upper.ends_with(".TW") || upper.ends_with(".TWO") {
            vec![upper]
        } else {
            vec![format!("{}.TW", upper), format!("{}.TWO", upper)]
        }
    }

    async fn fetch_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let period1 = day_start_utc(start).timestamp();
        let period2 = day_start_utc(end + Duration::days(1)).timestamp();

        let _guard = self.limiter.acquire().await;
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, symbol))
            .query(&[
                ("interval", "1d".to_string()),
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp.status(), "Yahoo chart"));
        }

        let body: YahooChartResponse = resp.json().await?;
        let bars = parse_chart(body)?;
        Ok(bars.into_iter().filter(|b| b.date >= start && b.date <= end).collect())
    }
}

fn day_start_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(taipei_offset()).single())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(Default::default()), Utc))
}

// Minimal response structs (only what we need)
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn parse_chart(body: YahooChartResponse) -> Result<Vec<PriceBar>, ProviderError> {
    if let Some(err) = body.chart.error {
        let code = err.code.unwrap_or_default();
        if code.eq_ignore_ascii_case("Not Found") {
            return Err(ProviderError::NotFound);
        }
        return Err(ProviderError::BadResponse(
            err.description.unwrap_or(code),
        ));
    }

    let Some(result) = body.chart.result.and_then(|mut r| r.pop()) else {
        return Ok(Vec::new());
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |series: &Vec<Option<f64>>, i: usize| series.get(i).copied().flatten();

    let mut bars: Vec<PriceBar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            // Rows with any hole are suspended or not-yet-settled sessions
            let open = at(&quote.open, i)?;
            let high = at(&quote.high, i)?;
            let low = at(&quote.low, i)?;
            let close = at(&quote.close, i)?;
            let volume = at(&quote.volume, i).unwrap_or(0.0);
            let date = taipei_date(DateTime::from_timestamp(*ts, 0)?);
            Some(PriceBar::new(date, open, high, low, close, volume))
        })
        .collect();

    // Ensure ascending by date, one bar per day
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    fn source(&self) -> DataSource {
        DataSource::Yahoo
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let mut last_error = None;

        for symbol in Self::symbol_candidates(ticker) {
            match self.fetch_symbol(&symbol, start, end).await {
                Ok(bars) if !bars.is_empty() => {
                    info!("✓ Yahoo returned {} bars for {}", bars.len(), symbol);
                    return Ok(bars);
                }
                Ok(_) => debug!("Yahoo returned no bars for {}", symbol),
                Err(ProviderError::NotFound) => debug!("Yahoo does not know {}", symbol),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}
