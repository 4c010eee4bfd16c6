//! Alert and inspection-task candidates produced by the batch jobs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// A matching report was filed near the user
    HazardNearby,
    /// The seasonal calendar says this month is high risk
    SeasonalRisk,
    /// A threshold rule fired on the weather forecast
    WeatherRule,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HazardNearby => "hazard_nearby",
            AlertType::SeasonalRisk => "seasonal_risk",
            AlertType::WeatherRule => "weather_rule",
        }
    }
}

/// An alert about to be persisted and pushed.
///
/// `alert_key` identifies the alert within its period; persistence uses
/// `(user_id, alert_key)` as the conflict target and the dispatcher reuses it
/// as the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertCandidate {
    pub user_id: Uuid,
    pub alert_type: AlertType,
    pub alert_key: String,
    pub severity: i16,
    pub title: String,
    pub message: String,
    pub hazard_id: Option<Uuid>,
    pub rule_id: Option<Uuid>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Other,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Other => "other",
        }
    }
}

/// An inspection task; `(user_id, crop_id, task_type, due_date)` is its identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCandidate {
    pub user_id: Uuid,
    pub crop_id: Uuid,
    pub task_type: TaskType,
    pub due_date: NaiveDate,
    pub title: String,
    pub hazard_id: Option<Uuid>,
}

impl TaskCandidate {
    pub fn identity(&self) -> (Uuid, Uuid, TaskType, NaiveDate) {
        (self.user_id, self.crop_id, self.task_type, self.due_date)
    }
}
