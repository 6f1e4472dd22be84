use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use taiwatch::models::{CategoryMap, InstitutionalFlowRecord, PriceBar};
use taiwatch::services::indicators::{rsv, stochastic_kd, DEFAULT_KD_PERIOD};
use taiwatch::services::metrics::compute_metrics;
use taiwatch::services::net_flow::{aggregate_flows, LOT_SIZE};

fn random_bars(rng: &mut StdRng, n: usize) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut close: f64 = 100.0;
    (0..n)
        .map(|i| {
            close = (close + rng.random_range(-5.0..5.0)).max(1.0);
            let high = close + rng.random_range(0.0..3.0);
            let low = (close - rng.random_range(0.0..3.0)).max(0.5);
            let volume = rng.random_range(0.0..5_000_000.0);
            PriceBar::new(start + Duration::days(i as i64), close, high, low, close, volume)
        })
        .collect()
}

#[test]
fn kd_stays_in_range_and_aligned() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let n = rng.random_range(0..120);
        let period = rng.random_range(1..20);
        let bars = random_bars(&mut rng, n);

        let points = stochastic_kd(&bars, period);
        assert_eq!(points.len(), bars.len());
        for (point, bar) in points.iter().zip(&bars) {
            assert_eq!(point.date, bar.date);
            assert!((0.0..=100.0).contains(&point.k), "K out of range: {}", point.k);
            assert!((0.0..=100.0).contains(&point.d), "D out of range: {}", point.d);
        }
        for value in rsv(&bars, period) {
            assert!((0.0..=100.0).contains(&value));
        }
    }
}

#[test]
fn flat_series_is_neutral() {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let bars: Vec<PriceBar> = (0..40)
        .map(|i| PriceBar::new(start + Duration::days(i), 10.0, 10.0, 10.0, 10.0, 1.0))
        .collect();

    for point in stochastic_kd(&bars, DEFAULT_KD_PERIOD) {
        assert_eq!(point.k, 50.0);
        assert_eq!(point.d, 50.0);
    }
}

#[test]
fn net_flow_total_is_sum_of_categories() {
    let mut rng = StdRng::seed_from_u64(11);
    let categories = CategoryMap::builtin();
    let labels = ["Foreign_Investor", "Investment_Trust", "Dealer_self", "Dealer_Hedging", "Unknown_Desk"];
    let date = NaiveDate::from_ymd_opt(2024, 10, 18).unwrap();

    for _ in 0..200 {
        let records: Vec<InstitutionalFlowRecord> = (0..rng.random_range(0..12))
            .map(|_| InstitutionalFlowRecord {
                date,
                category_label: labels[rng.random_range(0..labels.len())].to_string(),
                buy_quantity: rng.random_range(0.0..10_000_000.0),
                sell_quantity: rng.random_range(0.0..10_000_000.0),
            })
            .collect();

        let summary = aggregate_flows(&records, &categories);
        match summary.total {
            Some(total) => assert_eq!(total, summary.by_category.values().sum::<i64>()),
            None => assert!(summary.by_category.is_empty()),
        }
        assert!(!summary.by_category.contains_key("Unknown_Desk"));
        for (category, lots) in &summary.by_category {
            let (buy, sell) = records
                .iter()
                .filter(|r| categories.classify(&r.category_label) == Some(category.as_str()))
                .fold((0.0, 0.0), |(b, s), r| (b + r.buy_quantity, s + r.sell_quantity));
            assert_eq!(*lots, ((buy - sell) / LOT_SIZE).floor() as i64);
        }
    }
}

#[test]
fn metrics_need_two_bars_and_never_report_nan() {
    let mut rng = StdRng::seed_from_u64(3);

    assert!(compute_metrics(&[], Some(1_000.0)).is_none());
    assert!(compute_metrics(&random_bars(&mut rng, 1), Some(1_000.0)).is_none());

    for _ in 0..100 {
        let n = rng.random_range(2..40);
        let bars = random_bars(&mut rng, n);
        let shares = if rng.random_bool(0.5) { Some(rng.random_range(1.0..1e9)) } else { None };

        let metrics = compute_metrics(&bars, shares).unwrap();
        assert_eq!(metrics.date, bars[n - 1].date);
        for value in [metrics.percent_change, metrics.volume_ratio, metrics.turnover_rate, metrics.market_cap]
            .into_iter()
            .flatten()
        {
            assert!(value.is_finite());
        }
        assert_eq!(metrics.turnover_rate.is_some(), shares.is_some());
    }
}
