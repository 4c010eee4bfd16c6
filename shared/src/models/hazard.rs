//! Pests, diseases and the reports that track them

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::GeoPoint;

/// Highest value on the seasonal risk scale
pub const MAX_RISK_LEVEL: u8 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HazardKind {
    Pest,
    Disease,
}

impl HazardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Pest => "pest",
            HazardKind::Disease => "disease",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pest" => Some(HazardKind::Pest),
            "disease" => Some(HazardKind::Disease),
            _ => None,
        }
    }
}

/// A pest or disease with its seasonal risk calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hazard {
    pub id: Uuid,
    pub kind: HazardKind,
    pub common_name: String,
    /// Month (1-12) to risk level (0-5); missing months are risk 0
    pub seasonal_risk: BTreeMap<u32, u8>,
    /// Crops this hazard attacks
    pub host_crops: Vec<Uuid>,
}

impl Hazard {
    pub fn risk_level(&self, month: u32) -> u8 {
        self.seasonal_risk
            .get(&month)
            .copied()
            .unwrap_or(0)
            .min(MAX_RISK_LEVEL)
    }

    pub fn hosts(&self, crop_id: &Uuid) -> bool {
        self.host_crops.contains(crop_id)
    }

    pub fn hosts_any(&self, crops: &[Uuid]) -> bool {
        crops.iter().any(|c| self.hosts(c))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Active,
    Resolved,
    Hidden,
    Flagged,
}

impl ReportStatus {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hidden" => ReportStatus::Hidden,
            "flagged" => ReportStatus::Flagged,
            "resolved" => ReportStatus::Resolved,
            _ => ReportStatus::Active,
        }
    }

    /// Hidden and flagged reports never count as a signal
    pub fn is_visible(&self) -> bool {
        !matches!(self, ReportStatus::Hidden | ReportStatus::Flagged)
    }
}

/// A geotagged sighting of a hazard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HazardReport {
    pub id: Uuid,
    pub hazard_id: Option<Uuid>,
    pub category: Option<String>,
    pub location: GeoPoint,
    pub severity: i16,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// Normalise a report category for grouping
pub fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_lowercase(),
        _ => "unknown".to_string(),
    }
}
