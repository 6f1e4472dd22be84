use crate::models::{PriceBar, StockMetrics};

/// Bars averaged for the volume ratio, excluding the current bar.
pub const VOLUME_RATIO_WINDOW: usize = 5;

/// Day-over-day change in percent. `None` when the previous close is not a
/// usable denominator.
pub fn percent_change(previous_close: f64, close: f64) -> Option<f64> {
    if !(previous_close.is_finite() && previous_close > 0.0) || !close.is_finite() {
        return None;
    }
    Some((close - previous_close) * 100.0 / previous_close)
}

/// Latest volume divided by the mean of the `VOLUME_RATIO_WINDOW` bars
/// before it.
pub fn volume_ratio(bars: &[PriceBar]) -> Option<f64> {
    let (last, prior) = bars.split_last()?;
    if prior.len() < VOLUME_RATIO_WINDOW {
        return None;
    }

    let window = &prior[prior.len() - VOLUME_RATIO_WINDOW..];
    let average = window.iter().map(|b| b.volume).sum::<f64>() / VOLUME_RATIO_WINDOW as f64;
    if !(average.is_finite() && average > 0.0) {
        return None;
    }

    Some(last.volume / average)
}

/// Shares traded as a percentage of shares outstanding.
pub fn turnover_rate(volume: f64, share_count: Option<f64>) -> Option<f64> {
    let shares = usable_share_count(share_count)?;
    Some(volume * 100.0 / shares)
}

pub fn market_cap(close: f64, share_count: Option<f64>) -> Option<f64> {
    let shares = usable_share_count(share_count)?;
    Some(close * shares)
}

fn usable_share_count(share_count: Option<f64>) -> Option<f64> {
    share_count.filter(|s| s.is_finite() && *s > 0.0)
}

/// Derive the dashboard figures from the last bars of a series.
///
/// Needs at least two bars; with fewer there is no change to report.
pub fn compute_metrics(bars: &[PriceBar], share_count: Option<f64>) -> Option<StockMetrics> {
    let [.., previous, last] = bars else {
        return None;
    };

    Some(StockMetrics {
        date: last.date,
        close: last.close,
        change: last.close - previous.close,
        percent_change: percent_change(previous.close, last.close),
        volume: last.volume,
        volume_ratio: volume_ratio(bars),
        turnover_rate: turnover_rate(last.volume, share_count),
        market_cap: market_cap(last.close, share_count),
    })
}
