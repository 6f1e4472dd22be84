use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Provenance;
use crate::utils::{serialize_round2, serialize_round2_opt};

// ==============================================================================
// Scan request
// ==============================================================================

/// Thresholds for a whole-market scan. Unset thresholds do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanCriteria {
    #[serde(default)]
    pub min_change_pct: Option<f64>,
    #[serde(default)]
    pub max_change_pct: Option<f64>,
    #[serde(default)]
    pub min_volume_ratio: Option<f64>,
    #[serde(default)]
    pub min_turnover_pct: Option<f64>,
    #[serde(default)]
    pub max_pe_ratio: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ScanCriteria {
    /// Volume ratio and turnover need per-stock history and share counts.
    pub fn needs_per_stock_data(&self) -> bool {
        self.min_volume_ratio.is_some() || self.min_turnover_pct.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.min_change_pct, self.max_change_pct) {
            if min > max {
                return Err(format!("min_change_pct {} is above max_change_pct {}", min, max));
            }
        }
        let thresholds = [
            ("min_change_pct", self.min_change_pct),
            ("max_change_pct", self.max_change_pct),
            ("min_volume_ratio", self.min_volume_ratio),
            ("min_turnover_pct", self.min_turnover_pct),
            ("max_pe_ratio", self.max_pe_ratio),
        ];
        for (name, value) in thresholds {
            if matches!(value, Some(v) if !v.is_finite()) {
                return Err(format!("{} must be a finite number", name));
            }
        }
        if self.limit == Some(0) {
            return Err("limit must be positive".to_string());
        }
        Ok(())
    }
}

// ==============================================================================
// Scan response
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHit {
    pub ticker: String,
    pub name: String,
    #[serde(serialize_with = "serialize_round2")]
    pub close: f64,
    #[serde(serialize_with = "serialize_round2")]
    pub percent_change: f64,
    pub volume: f64,
    #[serde(serialize_with = "serialize_round2_opt")]
    pub volume_ratio: Option<f64>,
    #[serde(serialize_with = "serialize_round2_opt")]
    pub turnover_rate: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub pb_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub hits: Vec<ScanHit>,
    pub total_screened: usize,
    pub candidates_evaluated: usize,
    pub market: Provenance,
    pub scanned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_inverted_change_band() {
        let criteria = ScanCriteria {
            min_change_pct: Some(5.0),
            max_change_pct: Some(1.0),
            ..Default::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn per_stock_data_only_for_ratio_and_turnover() {
        let change_only = ScanCriteria { min_change_pct: Some(3.0), ..Default::default() };
        assert!(!change_only.needs_per_stock_data());

        let with_ratio = ScanCriteria { min_volume_ratio: Some(2.0), ..Default::default() };
        assert!(with_ratio.needs_per_stock_data());
    }
}
