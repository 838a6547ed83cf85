//! Lottery Data Model
//!
//! Durable records shared between the draw engine and the persistence layer.
//! Field names follow the camelCase layout of the stored JSON document.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A lottery number. Ranges are inclusive on both ends.
pub type Number = i64;

/// Identifier of a stored result (time-derived, unique within a store).
pub type ResultId = String;

/// Placeholder prize tier used until an administrator names one.
pub const DEFAULT_TITLE: &str = "一等奖";

pub const DEFAULT_MIN_NUMBER: Number = 1;
pub const DEFAULT_MAX_NUMBER: Number = 100;
pub const DEFAULT_COUNT: u32 = 5;

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Draw configuration for the prize tier currently being drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryConfig {
    /// Lowest drawable number (inclusive)
    pub min_number: Number,
    /// Highest drawable number (inclusive)
    pub max_number: Number,
    /// Winners per draw
    pub count: u32,
    /// Prize tier name, e.g. "一等奖"
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            min_number: DEFAULT_MIN_NUMBER,
            max_number: DEFAULT_MAX_NUMBER,
            count: DEFAULT_COUNT,
            title: default_title(),
        }
    }
}

impl LotteryConfig {
    pub fn new(min_number: Number, max_number: Number, count: u32, title: impl Into<String>) -> Self {
        Self {
            min_number,
            max_number,
            count,
            title: title.into(),
        }
    }

    /// Number of distinct values in `[min_number, max_number]`, or 0 when inverted.
    pub fn span(&self) -> u128 {
        range_span(self.min_number, self.max_number)
    }

    /// Checks the range/count invariants.
    ///
    /// Values are never clamped: an invalid configuration is rejected as a whole.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_number > self.max_number {
            return Err(ConfigError::InvertedRange {
                min: self.min_number,
                max: self.max_number,
            });
        }

        let span = self.span();
        if self.count == 0 || u128::from(self.count) > span {
            return Err(ConfigError::CountOutOfRange {
                count: self.count,
                span,
            });
        }

        Ok(())
    }

    /// Title to stamp on results; blank titles fall back to the placeholder.
    pub fn effective_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() {
            DEFAULT_TITLE
        } else {
            trimmed
        }
    }

    /// Applies a partial update. Unspecified fields are left unchanged.
    pub fn merged(&self, patch: &LotteryConfigPatch) -> Self {
        Self {
            min_number: patch.min_number.unwrap_or(self.min_number),
            max_number: patch.max_number.unwrap_or(self.max_number),
            count: patch.count.unwrap_or(self.count),
            title: patch.title.clone().unwrap_or_else(|| self.title.clone()),
        }
    }

    /// Returns true if `number` lies within the configured range.
    pub fn contains(&self, number: Number) -> bool {
        (self.min_number..=self.max_number).contains(&number)
    }
}

/// Partial configuration used for merge-updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_number: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl LotteryConfigPatch {
    pub fn range(mut self, min_number: Number, max_number: Number) -> Self {
        self.min_number = Some(min_number);
        self.max_number = Some(max_number);
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Rejected configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid range: minNumber {min} is greater than maxNumber {max}")]
    InvertedRange { min: Number, max: Number },
    #[error("Invalid count {count}: must be between 1 and the range size {span}")]
    CountOutOfRange { count: u32, span: u128 },
}

// ============================================================================
// RESULTS
// ============================================================================

/// A settled draw as recorded in history. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryResult {
    pub id: ResultId,
    /// Prize tier at draw time (copied, not referenced)
    pub title: String,
    pub numbers: Vec<Number>,
    /// Milliseconds since epoch
    pub timestamp: i64,
}

impl LotteryResult {
    /// Returns true if `numbers` holds no duplicate values.
    pub fn is_distinct(&self) -> bool {
        let mut seen = std::collections::HashSet::with_capacity(self.numbers.len());
        self.numbers.iter().all(|n| seen.insert(*n))
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Size of the inclusive range `[min, max]`; 0 when `min > max`.
pub fn range_span(min: Number, max: Number) -> u128 {
    if min > max {
        return 0;
    }
    (i128::from(max) - i128::from(min) + 1) as u128
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LotteryConfig::default();
        assert_eq!(config.min_number, 1);
        assert_eq!(config.max_number, 100);
        assert_eq!(config.count, 5);
        assert_eq!(config.title, "一等奖");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_count_larger_than_range_rejected() {
        let config = LotteryConfig::new(1, 5, 10, "一等奖");
        assert_eq!(
            config.validate(),
            Err(ConfigError::CountOutOfRange { count: 10, span: 5 })
        );
    }

    #[test]
    fn test_zero_count_rejected() {
        let config = LotteryConfig::new(1, 5, 0, "一等奖");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CountOutOfRange { count: 0, .. })
        ));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let config = LotteryConfig::new(10, 1, 1, "一等奖");
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedRange { min: 10, max: 1 })
        );
    }

    #[test]
    fn test_single_value_range() {
        let config = LotteryConfig::new(7, 7, 1, "特等奖");
        assert_eq!(config.span(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extreme_range_span() {
        assert_eq!(range_span(i64::MIN, i64::MAX), 1u128 << 64);
        assert_eq!(range_span(5, 4), 0);
    }

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let config = LotteryConfig::new(1, 100, 3, "二等奖");
        let merged = config.merged(&LotteryConfigPatch::default().count(10));

        assert_eq!(merged.count, 10);
        assert_eq!(merged.min_number, 1);
        assert_eq!(merged.max_number, 100);
        assert_eq!(merged.title, "二等奖");
    }

    #[test]
    fn test_blank_title_uses_placeholder() {
        let config = LotteryConfig::new(1, 10, 1, "   ");
        assert_eq!(config.effective_title(), DEFAULT_TITLE);
    }

    #[test]
    fn test_config_json_layout() {
        let json = r#"{"minNumber":1,"maxNumber":10,"count":5}"#;
        let config: LotteryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.title, DEFAULT_TITLE);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["minNumber"], 1);
        assert_eq!(value["maxNumber"], 10);
    }

    #[test]
    fn test_patch_skips_missing_fields() {
        let patch = LotteryConfigPatch::default().title("三等奖");
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({ "title": "三等奖" }));
    }

    #[test]
    fn test_result_distinctness() {
        let mut result = LotteryResult {
            id: "1".to_string(),
            title: "一等奖".to_string(),
            numbers: vec![1, 2, 3],
            timestamp: 0,
        };
        assert!(result.is_distinct());
        result.numbers.push(2);
        assert!(!result.is_distinct());
    }
}
