//! Threshold rules and their conditions

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user- or system-defined threshold rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
    pub scope: RuleScope,
    pub enabled: bool,
    pub condition: RuleCondition,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Whether the rule fired less than `cooldown_hours` before `now`
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown_hours: u32) -> bool {
        match self.last_fired_at {
            Some(fired) => now - fired < Duration::hours(i64::from(cooldown_hours)),
            None => false,
        }
    }
}

/// What a rule is attached to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RuleScope {
    User(Uuid),
    Garden(Uuid),
    /// Applies to every user with a known location
    Global,
}

impl RuleScope {
    /// Build a scope from the nullable columns rules are stored with.
    /// A garden takes precedence over a user when both are set.
    pub fn from_columns(user_id: Option<Uuid>, garden_id: Option<Uuid>) -> Self {
        match (garden_id, user_id) {
            (Some(garden), _) => RuleScope::Garden(garden),
            (None, Some(user)) => RuleScope::User(user),
            (None, None) => RuleScope::Global,
        }
    }
}

/// Rule condition, discriminated by `kind`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    Weather(WeatherCondition),
}

impl RuleCondition {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCondition::Weather(_) => "weather",
        }
    }
}

/// Compare an aggregated weather metric over a forward-looking window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherCondition {
    pub metric: WeatherMetric,
    pub operator: ComparisonOperator,
    pub value: f64,
    pub window_hours: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WeatherMetric {
    Temp,
    Rain,
    Wind,
}

/// How samples of a metric are reduced to one number over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Min,
    Sum,
    Max,
}

impl Aggregation {
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Min => "min",
            Aggregation::Sum => "sum",
            Aggregation::Max => "max",
        }
    }

    /// Reduce values; `None` when there is nothing to reduce
    pub fn apply<I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, v| match self {
            Aggregation::Min => acc.min(v),
            Aggregation::Sum => acc + v,
            Aggregation::Max => acc.max(v),
        }))
    }
}

impl WeatherMetric {
    /// Frost cares about the coldest hour, rain about the total, wind about gusts
    pub fn aggregation(&self) -> Aggregation {
        match self {
            WeatherMetric::Temp => Aggregation::Min,
            WeatherMetric::Rain => Aggregation::Sum,
            WeatherMetric::Wind => Aggregation::Max,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            WeatherMetric::Temp => "°C",
            WeatherMetric::Rain => "mm",
            WeatherMetric::Wind => "m/s",
        }
    }
}

impl std::fmt::Display for WeatherMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeatherMetric::Temp => write!(f, "temp"),
            WeatherMetric::Rain => write!(f, "rain"),
            WeatherMetric::Wind => write!(f, "wind"),
        }
    }
}

/// Tolerance used for `=` so sums like 0.1 + 0.2 compare equal to 0.3
pub const EQUALITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComparisonOperator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "=")]
    Eq,
}

impl ComparisonOperator {
    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            ComparisonOperator::Lt => lhs < rhs,
            ComparisonOperator::Gt => lhs > rhs,
            ComparisonOperator::Le => lhs <= rhs,
            ComparisonOperator::Ge => lhs >= rhs,
            ComparisonOperator::Eq => (lhs - rhs).abs() <= EQUALITY_EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Eq => "=",
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Outcome of evaluating one rule; `reason` is the audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleEvaluation {
    pub triggered: bool,
    pub reason: String,
}

impl RuleEvaluation {
    pub fn not_triggered(reason: impl Into<String>) -> Self {
        Self {
            triggered: false,
            reason: reason.into(),
        }
    }
}
