use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::models::{MarketQuote, PriceBar, ScanCriteria, ScanHit, ScanResponse, Valuation};
use crate::services::market_data_service::MarketDataService;
use crate::services::metrics::{turnover_rate, volume_ratio};

/// Calendar days of history fetched per candidate for the volume ratio.
const VOLUME_HISTORY_DAYS: u32 = 20;

/// Default number of hits returned when the request sets no limit.
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// A whole-market row that passed the cheap filters.
#[derive(Debug, Clone)]
struct Candidate {
    quote: MarketQuote,
    close: f64,
    percent_change: f64,
}

/// Ordinary shares carry four-digit codes; ETFs, warrants and preferreds don't.
fn is_ordinary_equity(ticker: &str) -> bool {
    ticker.len() == 4 && ticker.chars().all(|c| c.is_ascii_digit()) && !ticker.starts_with('0')
}

/// Filters that only need the whole-market table, sorted by change descending.
fn prefilter(quotes: &[MarketQuote], criteria: &ScanCriteria) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = quotes
        .iter()
        .filter(|q| is_ordinary_equity(&q.ticker) && q.volume > 0.0)
        .filter_map(|q| {
            Some(Candidate {
                close: q.close?,
                percent_change: q.percent_change()?,
                quote: q.clone(),
            })
        })
        .filter(|c| criteria.min_change_pct.map_or(true, |min| c.percent_change >= min))
        .filter(|c| criteria.max_change_pct.map_or(true, |max| c.percent_change <= max))
        .collect();

    candidates.sort_by(|a, b| {
        b.percent_change
            .partial_cmp(&a.percent_change)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

fn passes_valuation(valuation: Option<&Valuation>, criteria: &ScanCriteria) -> bool {
    match criteria.max_pe_ratio {
        None => true,
        // Loss-making companies publish no P/E and cannot satisfy a P/E ceiling
        Some(max) => valuation
            .and_then(|v| v.pe_ratio)
            .is_some_and(|pe| pe > 0.0 && pe <= max),
    }
}

/// Volume ratio of the quoted session. History that stops short of the
/// snapshot date would rate an older day, so it yields no ratio.
fn session_volume_ratio(bars: &[PriceBar], session: Option<NaiveDate>) -> Option<f64> {
    if let Some(session) = session {
        if bars.last()?.date != session {
            return None;
        }
    }
    volume_ratio(bars)
}

pub struct ScreeningService {
    market: Arc<MarketDataService>,
    max_candidates: usize,
}

impl ScreeningService {
    pub fn new(market: Arc<MarketDataService>, max_candidates: usize) -> Self {
        Self { market, max_candidates }
    }

    // -----------------------------------------------------------------------
    // Public entry point
    // -----------------------------------------------------------------------

    pub async fn scan(&self, criteria: &ScanCriteria) -> ScanResponse {
        let limit = criteria.limit.unwrap_or(DEFAULT_SCAN_LIMIT);

        // 1. Whole-market snapshot; without it there is nothing to scan
        let quotes = self.market.market_quotes().await;
        let market = quotes.provenance();
        let Some(quotes) = quotes.into_data() else {
            info!("Market snapshot unavailable; scan returns no hits");
            return ScanResponse {
                hits: Vec::new(),
                total_screened: 0,
                candidates_evaluated: 0,
                market,
                scanned_at: Utc::now(),
            };
        };
        let total_screened = quotes.len();

        // 2. Cheap filters on the table itself
        let mut candidates = prefilter(&quotes, criteria);
        info!("{} of {} stocks passed the change filters", candidates.len(), total_screened);

        // 3. Valuation table, only when a valuation criterion is set
        let valuations: HashMap<String, Valuation> = match criteria.max_pe_ratio {
            Some(_) => self
                .market
                .valuations()
                .await
                .into_data()
                .map(|rows| rows.iter().map(|v| (v.ticker.clone(), v.clone())).collect())
                .unwrap_or_default(),
            None => HashMap::new(),
        };
        candidates.retain(|c| passes_valuation(valuations.get(&c.quote.ticker), criteria));

        // 4. Per-stock data for the strongest candidates, one at a time
        let per_stock = criteria.needs_per_stock_data();
        if per_stock {
            candidates.truncate(self.max_candidates);
        }
        let candidates_evaluated = candidates.len();

        let mut hits = Vec::new();
        for candidate in candidates {
            if hits.len() >= limit {
                break;
            }
            let Some(hit) = self.evaluate(candidate, criteria, per_stock).await else {
                continue;
            };
            let valuation = valuations.get(&hit.ticker);
            hits.push(ScanHit {
                pe_ratio: valuation.and_then(|v| v.pe_ratio),
                dividend_yield: valuation.and_then(|v| v.dividend_yield),
                pb_ratio: valuation.and_then(|v| v.pb_ratio),
                ..hit
            });
        }

        info!("Scan produced {} hits", hits.len());
        ScanResponse {
            hits,
            total_screened,
            candidates_evaluated,
            market,
            scanned_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Per-stock evaluation
    // -----------------------------------------------------------------------

    /// `None` when a requested criterion fails or cannot be evaluated.
    async fn evaluate(&self, candidate: Candidate, criteria: &ScanCriteria, per_stock: bool) -> Option<ScanHit> {
        let ticker = candidate.quote.ticker.clone();
        let mut ratio = None;
        let mut turnover = None;

        if per_stock {
            if let Some(min_ratio) = criteria.min_volume_ratio {
                let bars = self.market.daily_bars(&ticker, VOLUME_HISTORY_DAYS).await.into_data()?;
                ratio = session_volume_ratio(&bars, candidate.quote.date);
                if ratio.is_none() {
                    debug!("{} has no volume ratio for session {:?}", ticker, candidate.quote.date);
                    return None;
                }
                if ratio? < min_ratio {
                    debug!("{} volume ratio {:?} below {}", ticker, ratio, min_ratio);
                    return None;
                }
            }

            if let Some(min_turnover) = criteria.min_turnover_pct {
                let shares = self.market.shares_outstanding(&ticker).await.into_data();
                turnover = turnover_rate(candidate.quote.volume, shares);
                if turnover? < min_turnover {
                    debug!("{} turnover {:?} below {}", ticker, turnover, min_turnover);
                    return None;
                }
            }
        }

        Some(ScanHit {
            ticker,
            name: candidate.quote.name,
            close: candidate.close,
            percent_change: candidate.percent_change,
            volume: candidate.quote.volume,
            volume_ratio: ratio,
            turnover_rate: turnover,
            pe_ratio: None,
            dividend_yield: None,
            pb_ratio: None,
        })
    }
}
