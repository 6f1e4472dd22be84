use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::external::provider::DataSource;
use crate::models::{NetFlowSummary, OscillatorPoint, PriceBar, StockMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceStatus {
    Available,
    Unavailable,
    Failed,
}

/// Where a block of data came from, or why it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub status: ProvenanceStatus,
    pub source: Option<DataSource>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProvenance {
    pub prices: Provenance,
    pub shares: Provenance,
    pub flows: Provenance,
}

/// Everything the dashboard shows for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub ticker: String,
    pub name: Option<String>,
    pub metrics: Option<StockMetrics>,
    pub kd: Option<OscillatorPoint>,
    pub net_flows: Option<NetFlowSummary>,
    pub provenance: SnapshotProvenance,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistSnapshotResponse {
    pub snapshots: Vec<StockSnapshot>,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdSeriesResponse {
    pub ticker: String,
    pub period: usize,
    pub bars: Vec<PriceBar>,
    pub points: Vec<OscillatorPoint>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowHistoryResponse {
    pub ticker: String,
    pub sessions: Vec<NetFlowSummary>,
    pub provenance: Provenance,
}
