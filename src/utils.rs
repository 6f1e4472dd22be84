use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serializer;

const TAIPEI_OFFSET_SECS: i32 = 8 * 3600;

pub fn taipei_offset() -> FixedOffset {
    FixedOffset::east_opt(TAIPEI_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Calendar date on the exchange's clock.
pub fn taipei_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&taipei_offset()).date_naive()
}

pub fn taipei_today() -> NaiveDate {
    taipei_date(Utc::now())
}

/// Round for display. Non-finite values pass through untouched.
pub fn round2(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}

pub fn serialize_round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round2(*value))
}

pub fn serialize_round2_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&round2(*v)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(-1.236), -1.24);
        assert_eq!(round2(10.0), 10.0);
        assert!(round2(f64::NAN).is_nan());
    }

    #[test]
    fn taipei_date_rolls_over_before_utc() {
        let late_utc = Utc.with_ymd_and_hms(2024, 10, 18, 17, 0, 0).unwrap();
        assert_eq!(taipei_date(late_utc), NaiveDate::from_ymd_opt(2024, 10, 19).unwrap());
    }
}
