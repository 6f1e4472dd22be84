use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

const BUILTIN_CATEGORY_MAP: &str = include_str!("../../config/institutional_categories.json");

// ==============================================================================
// Flow records
// ==============================================================================

/// One institutional-investor row as reported by a vendor, normalized to shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalFlowRecord {
    pub date: NaiveDate,
    pub category_label: String,
    pub buy_quantity: f64,
    pub sell_quantity: f64,
}

/// Net buy/sell per display category, in lots.
///
/// A category with no matching record is absent from `by_category`; a category
/// present with `0` really netted to zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetFlowSummary {
    pub date: Option<NaiveDate>,
    pub by_category: BTreeMap<String, i64>,
    pub total: Option<i64>,
}

// ==============================================================================
// Category map
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub category: String,
    pub labels: Vec<String>,
}

/// Ordered table of display category -> accepted vendor labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    pub categories: Vec<CategoryMapping>,
}

impl CategoryMap {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The table shipped in `config/institutional_categories.json`.
    pub fn builtin() -> Self {
        // The embedded file is covered by `builtin_map_parses`.
        Self::from_json(BUILTIN_CATEGORY_MAP).unwrap_or(Self { categories: Vec::new() })
    }

    /// Load a replacement table from disk, or fall back to the built-in one.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };

        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read category map {}: {}", path.display(), e))
        })?;

        let map = Self::from_json(&raw).map_err(|e| {
            AppError::Config(format!("invalid category map {}: {}", path.display(), e))
        })?;

        if map.categories.is_empty() {
            return Err(AppError::Config(format!("category map {} is empty", path.display())));
        }

        Ok(map)
    }

    /// Resolve a vendor label to its display category.
    ///
    /// Exact (case-insensitive) matches win over substring matches, and within
    /// each pass the first category in table order wins.
    pub fn classify(&self, label: &str) -> Option<&str> {
        let needle = label.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        let exact = self.categories.iter().find(|c| {
            c.labels.iter().any(|l| l.trim().to_lowercase() == needle)
        });
        if let Some(mapping) = exact {
            return Some(mapping.category.as_str());
        }

        self.categories
            .iter()
            .find(|c| {
                c.labels.iter().any(|l| {
                    let variant = l.trim().to_lowercase();
                    !variant.is_empty() && needle.contains(&variant)
                })
            })
            .map(|c| c.category.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_map_parses() {
        let map = CategoryMap::from_json(BUILTIN_CATEGORY_MAP).unwrap();
        let names: Vec<_> = map.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["foreign", "trust", "dealer"]);
    }

    #[test]
    fn classify_handles_english_and_localized_labels() {
        let map = CategoryMap::builtin();

        assert_eq!(map.classify("Foreign_Investor"), Some("foreign"));
        assert_eq!(map.classify("foreign_dealer_self"), Some("foreign"));
        assert_eq!(map.classify("Investment_Trust"), Some("trust"));
        assert_eq!(map.classify("Dealer_Hedging"), Some("dealer"));
        assert_eq!(map.classify("外陸資(不含外資自營商)"), Some("foreign"));
        assert_eq!(map.classify("投信"), Some("trust"));
        assert_eq!(map.classify("自營商(避險)"), Some("dealer"));
        assert_eq!(map.classify("Retail"), None);
        assert_eq!(map.classify("  "), None);
    }

    #[test]
    fn exact_match_beats_earlier_substring_match() {
        let map = CategoryMap::from_json(
            r#"{"categories":[
                {"category":"a","labels":["Dealer"]},
                {"category":"b","labels":["Dealer_self"]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(map.classify("Dealer_self"), Some("b"));
        assert_eq!(map.classify("Dealer_Hedging"), Some("a"));
    }

    #[test]
    fn load_without_path_uses_builtin() {
        assert_eq!(CategoryMap::load(None).unwrap(), CategoryMap::builtin());
    }
}
