//! Report trend insights and the subscriptions that watch them

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::BoundingBox;

/// Trend severity, ordered so that `High > Medium > Low`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Low,
    Medium,
    High,
}

impl InsightSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightSeverity::Low => "low",
            InsightSeverity::Medium => "medium",
            InsightSeverity::High => "high",
        }
    }
}

/// Percentage change from `previous` to `recent`.
///
/// Growth from nothing is reported as 100 rather than infinity. Halves round
/// towards positive infinity, so -12.5 becomes -12.
pub fn trend_pct(recent: i64, previous: i64) -> i64 {
    match (previous, recent) {
        (0, 0) => 0,
        (0, _) => 100,
        _ => {
            let pct = (recent - previous) as f64 / previous as f64 * 100.0;
            (pct + 0.5).floor() as i64
        }
    }
}

/// Classify a category's activity from its recent count and trend
pub fn classify_trend(recent: i64, trend_pct: i64) -> InsightSeverity {
    if recent >= 20 || trend_pct >= 75 {
        InsightSeverity::High
    } else if recent >= 8 || trend_pct >= 35 {
        InsightSeverity::Medium
    } else {
        InsightSeverity::Low
    }
}

/// Report counts for one category across the two comparison windows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    /// Lower-cased report category
    pub hazard: String,
    pub recent: i64,
    pub previous: i64,
    pub trend_pct: i64,
    pub severity: InsightSeverity,
    pub message: String,
    pub suggestion: String,
}

/// A user's standing request to be told about rising activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub bbox: Option<BoundingBox>,
    pub threshold_pct: i64,
    pub min_recent: i64,
    pub days: u32,
    /// Categories of interest; empty means all
    pub hazards: Vec<String>,
    pub active: bool,
}

impl InsightSubscription {
    pub fn matches(&self, insight: &Insight) -> bool {
        insight.trend_pct >= self.threshold_pct
            && insight.recent >= self.min_recent
            && (self.hazards.is_empty()
                || self
                    .hazards
                    .iter()
                    .any(|h| h.trim().eq_ignore_ascii_case(&insight.hazard)))
    }
}
