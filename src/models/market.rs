use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::services::metrics::percent_change;

/// One row of the exchange's end-of-day whole-market table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub ticker: String,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    /// Absolute change against the previous close.
    pub change: Option<f64>,
    pub volume: f64,
    pub trade_value: Option<f64>,
}

impl MarketQuote {
    pub fn previous_close(&self) -> Option<f64> {
        match (self.close, self.change) {
            (Some(close), Some(change)) => Some(close - change),
            _ => None,
        }
    }

    pub fn percent_change(&self) -> Option<f64> {
        percent_change(self.previous_close()?, self.close?)
    }
}

/// Valuation ratios published per listed stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub ticker: String,
    pub name: String,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub pb_ratio: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(close: Option<f64>, change: Option<f64>) -> MarketQuote {
        MarketQuote {
            ticker: "2330".into(),
            name: "台積電".into(),
            date: None,
            open: None,
            high: None,
            low: None,
            close,
            change,
            volume: 1_000.0,
            trade_value: None,
        }
    }

    #[test]
    fn percent_change_uses_reconstructed_previous_close() {
        let q = quote(Some(110.0), Some(10.0));
        assert_eq!(q.previous_close(), Some(100.0));
        assert_eq!(q.percent_change(), Some(10.0));
    }

    #[test]
    fn percent_change_unavailable_without_change() {
        assert_eq!(quote(Some(110.0), None).percent_change(), None);
        assert_eq!(quote(None, Some(1.0)).percent_change(), None);
    }
}
