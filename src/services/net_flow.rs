use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{CategoryMap, InstitutionalFlowRecord, NetFlowSummary};

/// Shares per board lot on the exchange.
pub const LOT_SIZE: f64 = 1000.0;

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Reduce one session's institutional rows to net lots per display category.
///
/// Each record is attributed to at most one category (see
/// [`CategoryMap::classify`]). Categories without a matching record are left
/// out of the result instead of being reported as zero.
pub fn aggregate_flows(records: &[InstitutionalFlowRecord], categories: &CategoryMap) -> NetFlowSummary {
    let mut sums: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for record in records {
        let Some(category) = categories.classify(&record.category_label) else {
            continue;
        };
        let entry = sums.entry(category.to_string()).or_insert((0.0, 0.0));
        entry.0 += finite_or_zero(record.buy_quantity);
        entry.1 += finite_or_zero(record.sell_quantity);
    }

    let by_category: BTreeMap<String, i64> = sums
        .into_iter()
        .map(|(category, (buy, sell))| (category, ((buy - sell) / LOT_SIZE).floor() as i64))
        .collect();

    let total = if by_category.is_empty() {
        None
    } else {
        Some(by_category.values().sum())
    };

    NetFlowSummary {
        date: records.iter().map(|r| r.date).max(),
        by_category,
        total,
    }
}

/// Records of the most recent date present.
pub fn latest_session(records: &[InstitutionalFlowRecord]) -> Vec<InstitutionalFlowRecord> {
    let Some(latest) = records.iter().map(|r| r.date).max() else {
        return Vec::new();
    };
    records.iter().filter(|r| r.date == latest).cloned().collect()
}

/// Aggregate every date separately, oldest first.
pub fn flow_history(records: &[InstitutionalFlowRecord], categories: &CategoryMap) -> Vec<NetFlowSummary> {
    let mut by_date: BTreeMap<NaiveDate, Vec<InstitutionalFlowRecord>> = BTreeMap::new();
    for record in records {
        by_date.entry(record.date).or_default().push(record.clone());
    }

    by_date
        .values()
        .map(|session| aggregate_flows(session, categories))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
    }

    fn record(d: u32, label: &str, buy: f64, sell: f64) -> InstitutionalFlowRecord {
        InstitutionalFlowRecord {
            date: date(d),
            category_label: label.to_string(),
            buy_quantity: buy,
            sell_quantity: sell,
        }
    }

    #[test]
    fn test_aggregates_english_labels_into_lots() {
        let records = vec![
            record(18, "Foreign_Investor", 5_000_000.0, 2_000_000.0),
            record(18, "Foreign_Dealer_Self", 10_000.0, 0.0),
            record(18, "Investment_Trust", 100_000.0, 350_000.0),
            record(18, "Dealer_self", 40_000.0, 10_000.0),
            record(18, "Dealer_Hedging", 0.0, 5_000.0),
        ];
        let summary = aggregate_flows(&records, &CategoryMap::builtin());

        assert_eq!(summary.by_category.get("foreign"), Some(&3_010));
        assert_eq!(summary.by_category.get("trust"), Some(&-250));
        assert_eq!(summary.by_category.get("dealer"), Some(&25));
        assert_eq!(summary.total, Some(2_785));
        assert_eq!(summary.date, Some(date(18)));
    }

    #[test]
    fn test_aggregates_localized_labels() {
        let records = vec![
            record(18, "外陸資(不含外資自營商)", 1_500.0, 500.0),
            record(18, "外資自營商", 1_000.0, 0.0),
            record(18, "投信", 0.0, 2_000.0),
            record(18, "自營商(自行買賣)", 3_000.0, 1_000.0),
            record(18, "自營商(避險)", 0.0, 1_000.0),
        ];
        let summary = aggregate_flows(&records, &CategoryMap::builtin());

        assert_eq!(summary.by_category.get("foreign"), Some(&2));
        assert_eq!(summary.by_category.get("trust"), Some(&-2));
        assert_eq!(summary.by_category.get("dealer"), Some(&1));
        assert_eq!(summary.total, Some(1));
    }

    #[test]
    fn test_unmatched_category_is_omitted() {
        let records = vec![record(18, "Foreign_Investor", 2_000.0, 1_000.0)];
        let summary = aggregate_flows(&records, &CategoryMap::builtin());

        assert_eq!(summary.by_category.len(), 1);
        assert!(!summary.by_category.contains_key("trust"));
        assert!(!summary.by_category.contains_key("dealer"));
    }

    #[test]
    fn test_matched_zero_net_is_present() {
        let records = vec![record(18, "Investment_Trust", 7_000.0, 7_000.0)];
        let summary = aggregate_flows(&records, &CategoryMap::builtin());

        assert_eq!(summary.by_category.get("trust"), Some(&0));
        assert_eq!(summary.total, Some(0));
    }

    #[test]
    fn test_no_records_has_no_total() {
        let summary = aggregate_flows(&[], &CategoryMap::builtin());
        assert!(summary.by_category.is_empty());
        assert_eq!(summary.total, None);
        assert_eq!(summary.date, None);
    }

    #[test]
    fn test_partial_lots_round_down() {
        let records = vec![
            record(18, "Investment_Trust", 0.0, 1_999.0),
            record(18, "Dealer_self", 1_999.0, 0.0),
        ];
        let summary = aggregate_flows(&records, &CategoryMap::builtin());

        assert_eq!(summary.by_category.get("trust"), Some(&-2));
        assert_eq!(summary.by_category.get("dealer"), Some(&1));
    }

    #[test]
    fn test_non_finite_quantities_count_as_zero() {
        let records = vec![record(18, "Dealer_self", f64::NAN, 3_000.0)];
        let summary = aggregate_flows(&records, &CategoryMap::builtin());
        assert_eq!(summary.by_category.get("dealer"), Some(&-3));
    }

    #[test]
    fn test_latest_session_and_history() {
        let records = vec![
            record(17, "Investment_Trust", 1_000.0, 0.0),
            record(18, "Investment_Trust", 0.0, 2_000.0),
            record(18, "Dealer_self", 4_000.0, 0.0),
        ];

        let latest = latest_session(&records);
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|r| r.date == date(18)));

        let history = flow_history(&records, &CategoryMap::builtin());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, Some(date(17)));
        assert_eq!(history[0].total, Some(1));
        assert_eq!(history[1].total, Some(2));
    }
}
