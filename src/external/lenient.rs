//! Number parsing for vendor payloads that mix JSON numbers with formatted
//! strings such as `"1,234.50"`, `"--"`, `"+0.50"` or `""`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse a vendor-formatted number. Placeholders and garbage yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '-') {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn value_to_f64(value: Option<Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(&s),
        _ => None,
    }
}

/// Missing, null or unparseable values become `None`.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_f64(Option::<Value>::deserialize(deserializer)?))
}

/// Missing, null or unparseable values become `0.0`.
pub fn f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_f64(Option::<Value>::deserialize(deserializer)?).unwrap_or(0.0))
}
