use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::external::sourced::Sourced;
use crate::models::{
    CategoryMap, FlowHistoryResponse, KdSeriesResponse, SnapshotProvenance, StockSnapshot, WatchlistEntry,
    WatchlistSnapshotResponse,
};
use crate::services::indicators::stochastic_kd;
use crate::services::market_data_service::MarketDataService;
use crate::services::metrics::compute_metrics;
use crate::services::net_flow::{aggregate_flows, flow_history, latest_session};

/// Calendar days searched for the most recent institutional session.
const LATEST_FLOW_LOOKBACK_DAYS: u32 = 10;

/// Assembles per-stock views from cached market data and the pure calculators.
pub struct DashboardService {
    market: Arc<MarketDataService>,
    categories: Arc<CategoryMap>,
    kd_period: usize,
    lookback_days: u32,
}

impl DashboardService {
    pub fn new(market: Arc<MarketDataService>, categories: Arc<CategoryMap>, kd_period: usize, lookback_days: u32) -> Self {
        Self { market, categories, kd_period, lookback_days }
    }

    pub fn market(&self) -> &Arc<MarketDataService> {
        &self.market
    }

    /// Metrics, latest K/D and latest net flows for one stock.
    ///
    /// Missing pieces are `None` with their provenance; this never fails.
    pub async fn snapshot(&self, ticker: &str, name: Option<&str>) -> StockSnapshot {
        let (bars, shares, flows) = futures::join!(
            self.market.daily_bars(ticker, self.lookback_days),
            self.market.shares_outstanding(ticker),
            self.market.institutional_flows(ticker, LATEST_FLOW_LOOKBACK_DAYS),
        );

        let provenance = SnapshotProvenance {
            prices: bars.provenance(),
            shares: shares.provenance(),
            flows: flows.provenance(),
        };

        let share_count = shares.data().copied();
        let (metrics, kd) = match bars.data() {
            Some(bars) => (
                compute_metrics(bars, share_count),
                stochastic_kd(bars, self.kd_period).last().copied(),
            ),
            None => (None, None),
        };

        let net_flows = flows
            .data()
            .map(|records| aggregate_flows(&latest_session(records), &self.categories));

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Some(name.to_string()),
            None => self.market.lookup_name(ticker).await,
        };

        debug!("Built snapshot for {} (prices {:?})", ticker, provenance.prices.status);
        StockSnapshot {
            ticker: ticker.to_string(),
            name,
            metrics,
            kd,
            net_flows,
            provenance,
            refreshed_at: Utc::now(),
        }
    }

    /// Snapshots for every entry, one ticker at a time to respect vendor limits.
    pub async fn watchlist_snapshots(&self, entries: &[WatchlistEntry]) -> WatchlistSnapshotResponse {
        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(self.snapshot(&entry.ticker, Some(&entry.name)).await);
        }

        info!("Built {} watchlist snapshots", snapshots.len());
        WatchlistSnapshotResponse { snapshots, refreshed_at: Utc::now() }
    }

    pub async fn kd_series(&self, ticker: &str, period: usize, days: u32) -> KdSeriesResponse {
        let bars = self.market.daily_bars(ticker, days).await;
        let provenance = bars.provenance();
        let bars = bars.into_data().unwrap_or_default();
        let points = stochastic_kd(&bars, period);

        KdSeriesResponse {
            ticker: ticker.to_string(),
            period,
            bars,
            points,
            provenance,
        }
    }

    pub async fn flow_history(&self, ticker: &str, days: u32) -> FlowHistoryResponse {
        let flows = self.market.institutional_flows(ticker, days).await;
        let provenance = flows.provenance();
        let sessions = match &flows {
            Sourced::Available { data, .. } => flow_history(data, &self.categories),
            _ => Vec::new(),
        };

        FlowHistoryResponse { ticker: ticker.to_string(), sessions, provenance }
    }

    /// Drop cached data for `ticker` so the next read goes to the providers.
    pub fn refresh(&self, ticker: &str) {
        self.market.invalidate_ticker(ticker);
    }
}
