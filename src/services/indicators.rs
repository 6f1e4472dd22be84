use crate::models::{OscillatorPoint, PriceBar};

pub const DEFAULT_KD_PERIOD: usize = 9;

const NEUTRAL: f64 = 50.0;
const SMOOTHING: f64 = 1.0 / 3.0;

/// Raw Stochastic Value (RSV)
///
/// Where the close sits inside the high/low range of the last `period` bars,
/// scaled to 0..=100. Returns one value per bar:
/// - 50.0 until a full window exists
/// - 50.0 when the window has no range (high == low)
/// - 50.0 when the window's dates are not strictly ascending
pub fn rsv(bars: &[PriceBar], period: usize) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if period == 0 || i + 1 < period {
                return NEUTRAL;
            }

            let window = &bars[i + 1 - period..=i];
            if !window.windows(2).all(|w| w[0].date < w[1].date) {
                return NEUTRAL;
            }

            let (low, high) = window.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), b| (lo.min(b.low), hi.max(b.high)),
            );

            let range = high - low;
            if !(range.is_finite() && range > 0.0) {
                return NEUTRAL;
            }

            let value = (bar.close - low) / range * 100.0;
            if value.is_finite() { value } else { NEUTRAL }
        })
        .collect()
}

/// KD Stochastic Oscillator
///
/// Smooths RSV twice with a 1/3 exponential weight (EWMA, center of mass 2):
/// - K[i] = K[i-1] * 2/3 + RSV[i] * 1/3
/// - D[i] = D[i-1] * 2/3 + K[i] * 1/3
///
/// Both lines are seeded at 50 on the first bar, so short or flat inputs
/// produce a neutral line instead of an error. Output is aligned 1:1 with
/// `bars`.
///
/// Interpretation:
/// - K above 80: overbought
/// - K below 20: oversold
/// - K crossing above D: bullish crossover
pub fn stochastic_kd(bars: &[PriceBar], period: usize) -> Vec<OscillatorPoint> {
    let rsv_values = rsv(bars, period);

    bars.iter()
        .zip(rsv_values)
        .enumerate()
        .scan((NEUTRAL, NEUTRAL), |(k, d), (i, (bar, rsv))| {
            if i > 0 {
                // k*2/3 + rsv/3, written so a neutral input keeps exactly 50.
                *k += (rsv - *k) * SMOOTHING;
                *d += (*k - *d) * SMOOTHING;
            }
            Some(OscillatorPoint { date: bar.date, k: *k, d: *d })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64)
    }

    fn bar(i: usize, low: f64, high: f64, close: f64) -> PriceBar {
        PriceBar::new(day(i), close, high, low, close, 1_000.0)
    }

    #[test]
    fn test_kd_empty_input() {
        assert!(stochastic_kd(&[], DEFAULT_KD_PERIOD).is_empty());
        assert!(rsv(&[], DEFAULT_KD_PERIOD).is_empty());
    }

    #[test]
    fn test_kd_short_input_is_neutral() {
        let bars: Vec<PriceBar> = (0..8).map(|i| bar(i, 10.0, 20.0, 19.0 - i as f64)).collect();
        let points = stochastic_kd(&bars, DEFAULT_KD_PERIOD);

        assert_eq!(points.len(), bars.len());
        for p in &points {
            assert_eq!(p.k, 50.0);
            assert_eq!(p.d, 50.0);
        }
    }

    #[test]
    fn test_kd_known_values() {
        // Window of 9 bars: lows 10, highs 20, last close 18 -> RSV 80.
        let bars: Vec<PriceBar> = (0..9).map(|i| bar(i, 10.0, 20.0, 18.0)).collect();
        let points = stochastic_kd(&bars, DEFAULT_KD_PERIOD);

        let expected_k = 50.0 * 2.0 / 3.0 + 80.0 / 3.0;
        let expected_d = 50.0 * 2.0 / 3.0 + expected_k / 3.0;
        let last = points.last().unwrap();
        assert!((last.k - expected_k).abs() < 1e-9);
        assert!((last.d - expected_d).abs() < 1e-9);
        assert_eq!(points[7].k, 50.0);
    }

    #[test]
    fn test_kd_flat_prices_stay_finite() {
        let bars: Vec<PriceBar> = (0..30).map(|i| bar(i, 100.0, 100.0, 100.0)).collect();
        let points = stochastic_kd(&bars, DEFAULT_KD_PERIOD);

        for p in &points {
            assert!(p.k.is_finite() && p.d.is_finite());
            assert!((p.k - 50.0).abs() < 1e-9);
            assert!((p.d - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_kd_rising_closes_approach_but_never_reach_100() {
        let bars: Vec<PriceBar> = (0..40)
            .map(|i| {
                let close = 10.0 + i as f64;
                bar(i, close - 1.0, close, close)
            })
            .collect();
        let points = stochastic_kd(&bars, DEFAULT_KD_PERIOD);

        for w in points[DEFAULT_KD_PERIOD - 1..].windows(2) {
            assert!(w[1].k > w[0].k);
            assert!(w[1].d > w[0].d);
        }
        let last = points.last().unwrap();
        assert!(last.k < 100.0 && last.d < 100.0);
        assert!(last.k > 99.0);
    }

    #[test]
    fn test_rsv_out_of_order_window_is_neutral() {
        let mut bars: Vec<PriceBar> = (0..9).map(|i| bar(i, 10.0, 20.0, 20.0)).collect();
        bars.swap(2, 3);

        let values = rsv(&bars, DEFAULT_KD_PERIOD);
        assert_eq!(values[8], 50.0);
    }

    #[test]
    fn test_rsv_zero_period_is_neutral() {
        let bars: Vec<PriceBar> = (0..3).map(|i| bar(i, 10.0, 20.0, 20.0)).collect();
        assert_eq!(rsv(&bars, 0), vec![50.0, 50.0, 50.0]);
    }
}
