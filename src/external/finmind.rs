use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::external::lenient::{f64_or_zero, opt_f64};
use crate::external::provider::{status_error, DataSource, MarketDataProvider, ProviderError};
use crate::models::{InstitutionalFlowRecord, PriceBar};
use crate::services::rate_limiter::RateLimiter;
use crate::utils::taipei_today;

const BASE_URL: &str = "https://api.finmindtrade.com/api/v4/data";

const PRICE_DATASET: &str = "TaiwanStockPrice";
const INSTITUTIONAL_DATASET: &str = "TaiwanStockInstitutionalInvestorsBuySell";
const SHAREHOLDING_DATASET: &str = "TaiwanStockShareholding";

/// Days searched backwards for the latest shareholding row.
const SHAREHOLDING_LOOKBACK_DAYS: i64 = 14;

/// FinMind open data API. Works anonymously at a low quota; a token raises it.
pub struct FinMindProvider {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct FinMindResponse<T> {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    #[serde(default, alias = "Open", deserialize_with = "opt_f64")]
    open: Option<f64>,
    #[serde(default, alias = "max", alias = "High", deserialize_with = "opt_f64")]
    high: Option<f64>,
    #[serde(default, alias = "min", alias = "Low", deserialize_with = "opt_f64")]
    low: Option<f64>,
    #[serde(default, alias = "Close", deserialize_with = "opt_f64")]
    close: Option<f64>,
    #[serde(
        default,
        rename = "Trading_Volume",
        alias = "Volume",
        alias = "volume",
        deserialize_with = "f64_or_zero"
    )]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct InstitutionalRow {
    date: NaiveDate,
    #[serde(alias = "institutional_investors")]
    name: String,
    #[serde(default, deserialize_with = "f64_or_zero")]
    buy: f64,
    #[serde(default, deserialize_with = "f64_or_zero")]
    sell: f64,
}

#[derive(Debug, Deserialize)]
struct ShareholdingRow {
    date: NaiveDate,
    #[serde(default, rename = "NumberOfSharesIssued", deserialize_with = "opt_f64")]
    shares_issued: Option<f64>,
}

impl FinMindProvider {
    pub fn new(client: reqwest::Client, token: Option<String>, limiter: Arc<RateLimiter>) -> Self {
        if token.is_none() {
            info!("FinMind token not set; using the anonymous quota");
        }
        Self {
            client,
            base_url: BASE_URL.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            limiter,
        }
    }

    async fn fetch_dataset<T: DeserializeOwned>(
        &self,
        dataset: &str,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<T>, ProviderError> {
        let _guard = self.limiter.acquire().await;

        let mut request = self.client.get(&self.base_url).query(&[
            ("dataset", dataset.to_string()),
            ("data_id", ticker.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
        ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        let status = resp.status();
        // FinMind answers 402 Payment Required once the hourly quota is used up
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            warn!("FinMind quota exhausted while fetching {} for {}", dataset, ticker);
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(status_error(status, "FinMind"));
        }

        let text = resp.text().await?;
        parse_response(&text)
    }
}

fn parse_response<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, ProviderError> {
    let body: FinMindResponse<T> =
        serde_json::from_str(text).map_err(|e| ProviderError::Parse(format!("FinMind: {}", e)))?;

    match body.status {
        Some(402) => Err(ProviderError::RateLimited),
        Some(code) if code != 200 => Err(ProviderError::BadResponse(format!(
            "FinMind status {}: {}",
            code,
            body.msg.unwrap_or_default()
        ))),
        _ => Ok(body.data),
    }
}

fn price_rows_to_bars(rows: Vec<PriceRow>) -> Vec<PriceBar> {
    let mut bars: Vec<PriceBar> = rows
        .into_iter()
        .filter_map(|row| {
            Some(PriceBar::new(row.date, row.open?, row.high?, row.low?, row.close?, row.volume))
        })
        // Suspended sessions come back as all-zero rows
        .filter(|bar| bar.close > 0.0)
        .collect();
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

#[async_trait]
impl MarketDataProvider for FinMindProvider {
    fn source(&self) -> DataSource {
        DataSource::FinMind
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let rows: Vec<PriceRow> = self.fetch_dataset(PRICE_DATASET, ticker, start, end).await?;
        let bars = price_rows_to_bars(rows);
        debug!("FinMind returned {} bars for {}", bars.len(), ticker);
        Ok(bars)
    }

    async fn fetch_institutional_flows(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<InstitutionalFlowRecord>, ProviderError> {
        let rows: Vec<InstitutionalRow> =
            self.fetch_dataset(INSTITUTIONAL_DATASET, ticker, start, end).await?;

        Ok(rows
            .into_iter()
            .map(|row| InstitutionalFlowRecord {
                date: row.date,
                category_label: row.name,
                buy_quantity: row.buy,
                sell_quantity: row.sell,
            })
            .collect())
    }

    async fn fetch_shares_outstanding(&self, ticker: &str) -> Result<Option<f64>, ProviderError> {
        let end = taipei_today();
        let start = end - Duration::days(SHAREHOLDING_LOOKBACK_DAYS);
        let rows: Vec<ShareholdingRow> =
            self.fetch_dataset(SHAREHOLDING_DATASET, ticker, start, end).await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.shares_issued.is_some_and(|s| s > 0.0))
            .max_by_key(|row| row.date)
            .and_then(|row| row.shares_issued))
    }
}
