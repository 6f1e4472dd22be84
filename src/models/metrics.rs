use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::{serialize_round2, serialize_round2_opt};

/// Per-stock figures derived from the latest bars.
///
/// `None` always means "could not compute"; it is never a stand-in for zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMetrics {
    pub date: NaiveDate,
    #[serde(serialize_with = "serialize_round2")]
    pub close: f64,
    #[serde(serialize_with = "serialize_round2")]
    pub change: f64,
    #[serde(serialize_with = "serialize_round2_opt")]
    pub percent_change: Option<f64>,
    pub volume: f64,
    #[serde(serialize_with = "serialize_round2_opt")]
    pub volume_ratio: Option<f64>,
    #[serde(serialize_with = "serialize_round2_opt")]
    pub turnover_rate: Option<f64>,
    #[serde(serialize_with = "serialize_round2_opt")]
    pub market_cap: Option<f64>,
}
