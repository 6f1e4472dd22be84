use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::external::lenient::{f64_or_zero, opt_f64, parse_number};
use crate::external::provider::{status_error, DataSource, MarketDataProvider, ProviderError};
use crate::models::{InstitutionalFlowRecord, MarketQuote, Valuation};
use crate::services::rate_limiter::RateLimiter;
use crate::services::ttl_cache::TtlCache;

const OPENAPI_URL: &str = "https://openapi.twse.com.tw/v1";
const T86_URL: &str = "https://www.twse.com.tw/rwd/zh/fund/T86";

/// Calendar days walked back when looking for published T86 sessions.
const MAX_T86_DAYS: i64 = 10;

/// Offset between the ROC calendar used by the exchange and the Gregorian one.
const ROC_YEAR_OFFSET: i32 = 1911;

const BUY_MARKER: &str = "買進股數";
const SELL_MARKER: &str = "賣出股數";

type FlowTable = Arc<HashMap<String, Vec<InstitutionalFlowRecord>>>;

/// Taiwan Stock Exchange public endpoints: the OpenAPI whole-market tables
/// and the daily institutional trading report (T86).
///
/// The whole-market tables are fetched once and kept in an internal cache;
/// per-ticker lookups are served from it.
pub struct TwseProvider {
    client: reqwest::Client,
    openapi_url: String,
    t86_url: String,
    limiter: Arc<RateLimiter>,
    shares: TtlCache<(), Arc<HashMap<String, f64>>>,
    flow_sessions: TtlCache<NaiveDate, FlowTable>,
}

#[derive(Debug, Deserialize)]
struct DayAllRow {
    #[serde(rename = "Date", default)]
    date: Option<String>,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "TradeVolume", default, deserialize_with = "f64_or_zero")]
    trade_volume: f64,
    #[serde(rename = "TradeValue", default, deserialize_with = "opt_f64")]
    trade_value: Option<f64>,
    #[serde(rename = "OpeningPrice", default, deserialize_with = "opt_f64")]
    opening_price: Option<f64>,
    #[serde(rename = "HighestPrice", default, deserialize_with = "opt_f64")]
    highest_price: Option<f64>,
    #[serde(rename = "LowestPrice", default, deserialize_with = "opt_f64")]
    lowest_price: Option<f64>,
    #[serde(rename = "ClosingPrice", default, deserialize_with = "opt_f64")]
    closing_price: Option<f64>,
    #[serde(rename = "Change", default, deserialize_with = "opt_f64")]
    change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ValuationRow {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "PEratio", default, deserialize_with = "opt_f64")]
    pe_ratio: Option<f64>,
    #[serde(rename = "DividendYield", default, deserialize_with = "opt_f64")]
    dividend_yield: Option<f64>,
    #[serde(rename = "PBratio", default, deserialize_with = "opt_f64")]
    pb_ratio: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CompanyRow {
    #[serde(rename = "公司代號")]
    code: String,
    #[serde(rename = "已發行普通股數或TDR原股發行股數", default, deserialize_with = "opt_f64")]
    shares_issued: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct T86Response {
    #[serde(default)]
    stat: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

/// Parse an ROC calendar date such as `1131018` or `113/10/18`.
pub fn parse_roc_date(raw: &str) -> Option<NaiveDate> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 7 {
        return None;
    }
    let (year, rest) = digits.split_at(digits.len() - 4);
    let year: i32 = year.parse().ok()?;
    let month: u32 = rest[..2].parse().ok()?;
    let day: u32 = rest[2..].parse().ok()?;
    NaiveDate::from_ymd_opt(year + ROC_YEAR_OFFSET, month, day)
}

fn quotes_from_rows(rows: Vec<DayAllRow>) -> Vec<MarketQuote> {
    rows.into_iter()
        .map(|row| MarketQuote {
            ticker: row.code.trim().to_string(),
            name: row.name.trim().to_string(),
            date: row.date.as_deref().and_then(parse_roc_date),
            open: row.opening_price,
            high: row.highest_price,
            low: row.lowest_price,
            close: row.closing_price,
            change: row.change,
            volume: row.trade_volume,
            trade_value: row.trade_value,
        })
        .filter(|q| !q.ticker.is_empty())
        .collect()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Turn one T86 report into per-ticker records.
///
/// Categories are derived from the column pairs `<label>買進股數` /
/// `<label>賣出股數`, so `外陸資買進股數(不含外資自營商)` becomes the label
/// `外陸資(不含外資自營商)`. Net-only columns are skipped.
fn parse_t86(report: T86Response, date: NaiveDate) -> HashMap<String, Vec<InstitutionalFlowRecord>> {
    let mut table = HashMap::new();
    if report.stat != "OK" {
        return table;
    }

    let Some(code_idx) = report.fields.iter().position(|f| f.contains("代號")) else {
        return table;
    };

    let pairs: Vec<(String, usize, usize)> = report
        .fields
        .iter()
        .enumerate()
        .filter(|(_, field)| field.contains(BUY_MARKER))
        .filter_map(|(buy_idx, field)| {
            let sell_field = field.replace(BUY_MARKER, SELL_MARKER);
            let sell_idx = report.fields.iter().position(|f| *f == sell_field)?;
            Some((field.replace(BUY_MARKER, ""), buy_idx, sell_idx))
        })
        .collect();

    for row in &report.data {
        let Some(code) = row.get(code_idx).map(cell_text) else {
            continue;
        };
        let records: Vec<InstitutionalFlowRecord> = pairs
            .iter()
            .map(|(label, buy_idx, sell_idx)| {
                let quantity = |idx: &usize| {
                    row.get(*idx)
                        .and_then(|v| match v {
                            Value::Number(n) => n.as_f64(),
                            other => parse_number(&cell_text(other)),
                        })
                        .unwrap_or(0.0)
                };
                InstitutionalFlowRecord {
                    date,
                    category_label: label.clone(),
                    buy_quantity: quantity(buy_idx),
                    sell_quantity: quantity(sell_idx),
                }
            })
            .collect();
        table.insert(code, records);
    }

    table
}

impl TwseProvider {
    pub fn new(client: reqwest::Client, limiter: Arc<RateLimiter>, reference_ttl: Duration) -> Self {
        Self {
            client,
            openapi_url: OPENAPI_URL.to_string(),
            t86_url: T86_URL.to_string(),
            limiter,
            shares: TtlCache::new(reference_ttl),
            flow_sessions: TtlCache::new(reference_ttl),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ProviderError> {
        let _guard = self.limiter.acquire().await;
        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp.status(), "TWSE"));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Parse(format!("TWSE {}: {}", url, e)))
    }

    async fn openapi<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.openapi_url, path);
        self.get_json(&url, &[]).await
    }

    async fn share_table(&self) -> Result<Arc<HashMap<String, f64>>, ProviderError> {
        if let Some(table) = self.shares.get(&()) {
            return Ok(table);
        }

        let rows: Vec<CompanyRow> = self.openapi("opendata/t187ap03_L").await?;
        let table: HashMap<String, f64> = rows
            .into_iter()
            .filter_map(|row| Some((row.code.trim().to_string(), row.shares_issued.filter(|s| *s > 0.0)?)))
            .collect();

        info!("Loaded shares issued for {} listed companies", table.len());
        let table = Arc::new(table);
        if !table.is_empty() {
            self.shares.insert((), table.clone());
        }
        Ok(table)
    }

    async fn flow_session(&self, date: NaiveDate) -> Result<FlowTable, ProviderError> {
        if let Some(table) = self.flow_sessions.get(&date) {
            return Ok(table);
        }

        let report: T86Response = self
            .get_json(
                &self.t86_url,
                &[
                    ("date", date.format("%Y%m%d").to_string()),
                    ("selectType", "ALLBUT0999".to_string()),
                    ("response", "json".to_string()),
                ],
            )
            .await?;

        let table = Arc::new(parse_t86(report, date));
        if table.is_empty() {
            // Holidays stay empty; today's report may still be published later
            self.flow_sessions.insert_with_ttl(date, table.clone(), Duration::minutes(10));
        } else {
            debug!("T86 {} covers {} tickers", date, table.len());
            self.flow_sessions.insert(date, table.clone());
        }
        Ok(table)
    }
}

#[async_trait]
impl MarketDataProvider for TwseProvider {
    fn source(&self) -> DataSource {
        DataSource::Twse
    }

    fn clear_caches(&self) {
        self.shares.clear();
        self.flow_sessions.clear();
        debug!("Cleared TWSE share and T86 session tables");
    }

    async fn fetch_institutional_flows(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<InstitutionalFlowRecord>, ProviderError> {
        let mut records = Vec::new();
        let mut date = end;
        let earliest = start.max(end - Duration::days(MAX_T86_DAYS - 1));

        while date >= earliest {
            let weekend = matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
            if !weekend {
                let session = self.flow_session(date).await?;
                if let Some(rows) = session.get(ticker) {
                    records.extend(rows.iter().cloned());
                }
            }
            match date.pred_opt() {
                Some(previous) => date = previous,
                None => break,
            }
        }

        records.sort_by_key(|r| r.date);
        Ok(records)
    }

    async fn fetch_shares_outstanding(&self, ticker: &str) -> Result<Option<f64>, ProviderError> {
        Ok(self.share_table().await?.get(ticker).copied())
    }

    async fn fetch_market_quotes(&self) -> Result<Vec<MarketQuote>, ProviderError> {
        let rows: Vec<DayAllRow> = self.openapi("exchangeReport/STOCK_DAY_ALL").await?;
        Ok(quotes_from_rows(rows))
    }

    async fn fetch_valuations(&self) -> Result<Vec<Valuation>, ProviderError> {
        let rows: Vec<ValuationRow> = self.openapi("exchangeReport/BWIBYK_ALL").await?;
        Ok(rows
            .into_iter()
            .map(|row| Valuation {
                ticker: row.code.trim().to_string(),
                name: row.name.trim().to_string(),
                pe_ratio: row.pe_ratio,
                dividend_yield: row.dividend_yield,
                pb_ratio: row.pb_ratio,
            })
            .collect())
    }
}
