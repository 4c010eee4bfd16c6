//! Threshold rule evaluation and the `weather-rules` job
//!
//! Each condition kind has its own evaluator behind [`ConditionEvaluator`];
//! [`RuleEvaluator`] only routes on the kind. Evaluation never fails: a
//! provider error becomes a non-triggered result whose reason says so.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use shared::{
    bucket_start, validate_condition, AlertCandidate, AlertType, DedupClaim, GeoPoint,
    MetricSample, PushPayload, Rule, RuleCondition, RuleEvaluation, RuleScope, TimeWindow,
    UserProfile, WeatherCondition,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::batch::{run_batch, BatchLimits, BatchReport, UnitReport, UnitStatus};
use super::dispatcher::NotificationDispatcher;
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::error::AppResult;
use crate::external::MetricSource;
use crate::repository::MonitorStore;

/// Severity given to every weather rule alert
const RULE_ALERT_SEVERITY: i16 = 3;

/// Who receives a rule's result and where its weather comes from
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTarget {
    pub user_id: Uuid,
    pub location: GeoPoint,
    /// Human readable scope, embedded in every reason
    pub label: String,
}

/// Evaluates one kind of rule condition
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    type Condition: Sync;

    async fn evaluate(
        &self,
        condition: &Self::Condition,
        target: &RuleTarget,
        now: DateTime<Utc>,
    ) -> RuleEvaluation;
}

// ============================================================================
// Weather conditions
// ============================================================================

pub struct WeatherEvaluator {
    metrics: Arc<dyn MetricSource>,
    fetch_timeout: Duration,
}

impl WeatherEvaluator {
    pub fn new(metrics: Arc<dyn MetricSource>, fetch_timeout: Duration) -> Self {
        Self {
            metrics,
            fetch_timeout,
        }
    }
}

#[async_trait]
impl ConditionEvaluator for WeatherEvaluator {
    type Condition = WeatherCondition;

    async fn evaluate(
        &self,
        condition: &WeatherCondition,
        target: &RuleTarget,
        now: DateTime<Utc>,
    ) -> RuleEvaluation {
        let window = TimeWindow::ahead(now, condition.window_hours);
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.metrics.fetch_samples(target.location, window),
        )
        .await;

        let samples = match fetched {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => return fetch_error(condition, &target.label, e),
            Err(_) => {
                return fetch_error(
                    condition,
                    &target.label,
                    format!("timed out after {}s", self.fetch_timeout.as_secs()),
                )
            }
        };

        evaluate_weather_samples(condition, &samples, window, &target.label)
    }
}

fn fetch_error(
    condition: &WeatherCondition,
    label: &str,
    error: impl std::fmt::Display,
) -> RuleEvaluation {
    RuleEvaluation::not_triggered(format!(
        "error fetching {} for next {}h at {}: {}",
        condition.metric, condition.window_hours, label, error
    ))
}

/// Aggregate the samples inside `[window.start, window.end]` and compare.
///
/// Deterministic for the same inputs; the reason names the metric, the
/// aggregate, the operator, the threshold, the window and the scope.
pub fn evaluate_weather_samples(
    condition: &WeatherCondition,
    samples: &[MetricSample],
    window: TimeWindow,
    label: &str,
) -> RuleEvaluation {
    let metric = condition.metric;
    let aggregation = metric.aggregation();
    let aggregate = aggregation.apply(
        samples
            .iter()
            .filter(|s| s.timestamp >= window.start && s.timestamp <= window.end)
            .filter_map(|s| s.value(metric)),
    );

    let Some(aggregate) = aggregate else {
        return RuleEvaluation::not_triggered(format!(
            "no data for {} in next {}h at {}",
            metric, condition.window_hours, label
        ));
    };

    let triggered = condition.operator.compare(aggregate, condition.value);
    let reason = format!(
        "{} {}={:.2}{} {} {:.2}{} over next {}h at {}: {}",
        metric,
        aggregation.label(),
        aggregate,
        metric.unit(),
        condition.operator,
        condition.value,
        metric.unit(),
        condition.window_hours,
        label,
        if triggered { "triggered" } else { "not triggered" }
    );

    RuleEvaluation { triggered, reason }
}

/// Routes a condition to the evaluator for its kind
pub struct RuleEvaluator {
    weather: WeatherEvaluator,
}

impl RuleEvaluator {
    pub fn new(weather: WeatherEvaluator) -> Self {
        Self { weather }
    }

    pub async fn evaluate(
        &self,
        condition: &RuleCondition,
        target: &RuleTarget,
        now: DateTime<Utc>,
    ) -> RuleEvaluation {
        match condition {
            RuleCondition::Weather(weather) => self.weather.evaluate(weather, target, now).await,
        }
    }
}

/// How long a triggered rule's alert stays valid
fn condition_horizon(condition: &RuleCondition) -> ChronoDuration {
    match condition {
        RuleCondition::Weather(weather) => ChronoDuration::hours(i64::from(weather.window_hours)),
    }
}

// ============================================================================
// weather-rules job
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RuleSettings {
    pub cooldown_hours: u32,
    pub rule_batch_limit: i64,
    pub profile_batch_limit: i64,
}

impl From<&MonitorConfig> for RuleSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            cooldown_hours: config.rule_cooldown_hours,
            rule_batch_limit: config.rule_batch_limit,
            profile_batch_limit: config.profile_batch_limit,
        }
    }
}

pub struct RuleService {
    store: Arc<dyn MonitorStore>,
    evaluator: RuleEvaluator,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    settings: RuleSettings,
}

impl RuleService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        evaluator: RuleEvaluator,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        settings: RuleSettings,
    ) -> Self {
        Self {
            store,
            evaluator,
            dispatcher,
            clock,
            settings,
        }
    }

    /// Evaluate every enabled rule and notify the targets of those that fire
    pub async fn run(&self, limits: BatchLimits) -> AppResult<BatchReport> {
        let now = self.clock.now();
        let rules = self.store.list_enabled_rules(self.settings.rule_batch_limit).await?;

        let located = if rules.iter().any(|r| r.scope == RuleScope::Global) {
            self.store
                .list_located_profiles(self.settings.profile_batch_limit)
                .await?
        } else {
            Vec::new()
        };

        tracing::info!(rules = rules.len(), "Evaluating weather rules");

        let report = run_batch("weather-rules", rules, limits, |rule| {
            self.process_rule(rule, now, &located)
        })
        .await;

        Ok(report)
    }

    async fn process_rule(
        &self,
        rule: Rule,
        now: DateTime<Utc>,
        located: &[UserProfile],
    ) -> UnitReport {
        if rule.in_cooldown(now, self.settings.cooldown_hours) {
            tracing::debug!(rule_id = %rule.id, "Rule in cooldown");
            return UnitReport::skipped();
        }

        if let Err(msg) = validate_condition(&rule.condition) {
            tracing::warn!(rule_id = %rule.id, kind = rule.condition.kind(), "Skipping invalid rule: {}", msg);
            return UnitReport::skipped();
        }

        let targets = match self.resolve_targets(&rule, located).await {
            Ok(targets) if targets.is_empty() => {
                tracing::warn!(rule_id = %rule.id, "Rule scope has no located target");
                return UnitReport::skipped();
            }
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, "Failed to resolve rule scope: {}", e);
                return UnitReport::failed();
            }
        };

        let mut unit = UnitReport::processed();
        for target in &targets {
            let evaluation = self.evaluator.evaluate(&rule.condition, target, now).await;
            tracing::debug!(rule_id = %rule.id, user_id = %target.user_id, "{}", evaluation.reason);

            if !evaluation.triggered {
                continue;
            }
            unit.triggered += 1;

            let alert = self.rule_alert(&rule, target, &evaluation, now);
            match self.store.upsert_alerts(std::slice::from_ref(&alert)).await {
                Ok(inserted) => unit.alerts += inserted,
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, user_id = %target.user_id, "Failed to store rule alert: {}", e);
                    unit.status = UnitStatus::Failed;
                    continue;
                }
            }

            let payload = PushPayload::new(alert.title.clone(), alert.message.clone())
                .with_tag(alert.alert_key.clone());
            let claim = DedupClaim::new(alert.alert_key.clone(), AlertType::WeatherRule.as_str());
            match self.dispatcher.dispatch(target.user_id, &payload, Some(&claim)).await {
                Ok(outcome) => unit.record_dispatch(&outcome),
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, user_id = %target.user_id, "Rule notification failed: {}", e);
                    unit.status = UnitStatus::Failed;
                }
            }
        }

        if unit.triggered > 0 {
            if let Err(e) = self.store.mark_rule_fired(rule.id, now).await {
                tracing::warn!(rule_id = %rule.id, "Failed to stamp last_fired_at: {}", e);
                unit.status = UnitStatus::Failed;
            }
        }

        unit
    }

    async fn resolve_targets(
        &self,
        rule: &Rule,
        located: &[UserProfile],
    ) -> AppResult<Vec<RuleTarget>> {
        let targets = match rule.scope {
            RuleScope::User(user_id) => self
                .store
                .get_profile(user_id)
                .await?
                .and_then(|profile| {
                    profile.location.map(|location| RuleTarget {
                        user_id,
                        location,
                        label: format!("user {}", user_id),
                    })
                })
                .into_iter()
                .collect(),
            RuleScope::Garden(garden_id) => self
                .store
                .get_garden(garden_id)
                .await?
                .and_then(|garden| {
                    garden.location.map(|location| RuleTarget {
                        user_id: garden.owner_id,
                        location,
                        label: format!("garden {}", garden.name),
                    })
                })
                .into_iter()
                .collect(),
            RuleScope::Global => located
                .iter()
                .filter_map(|profile| {
                    profile.location.map(|location| RuleTarget {
                        user_id: profile.id,
                        location,
                        label: format!("user {}", profile.id),
                    })
                })
                .collect(),
        };

        Ok(targets)
    }

    fn rule_alert(
        &self,
        rule: &Rule,
        target: &RuleTarget,
        evaluation: &RuleEvaluation,
        now: DateTime<Utc>,
    ) -> AlertCandidate {
        AlertCandidate {
            user_id: target.user_id,
            alert_type: AlertType::WeatherRule,
            alert_key: rule_alert_key(rule.id, now, self.settings.cooldown_hours),
            severity: RULE_ALERT_SEVERITY,
            title: rule.name.clone(),
            message: evaluation.reason.clone(),
            hazard_id: None,
            rule_id: Some(rule.id),
            valid_from: now,
            valid_to: now + condition_horizon(&rule.condition),
        }
    }
}

/// One key per rule per cooldown bucket, so a rule notifies at most once per bucket
pub fn rule_alert_key(rule_id: Uuid, now: DateTime<Utc>, cooldown_hours: u32) -> String {
    format!(
        "rule:{}:{}",
        rule_id,
        bucket_start(now, cooldown_hours).format("%Y%m%dT%H")
    )
}
