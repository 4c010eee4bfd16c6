//! In-memory fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::{
    normalize_category, AlertCandidate, BoundingBox, CategoryCount, DailyWeatherSummary,
    DedupClaim, GeoPoint, Garden, Hazard, HazardReport, InsightSubscription, MetricSample,
    PushPayload, PushSubscription, Rule, TaskCandidate, TimeWindow, UserProfile,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use gardenwatch::clock::FixedClock;
use gardenwatch::config::{
    Config, CronConfig, DatabaseConfig, MonitorConfig, PushConfig, ServerConfig, WeatherConfig,
};
use gardenwatch::error::{AppError, AppResult};
use gardenwatch::external::{MetricSource, PushFailure, PushSender};
use gardenwatch::repository::{LedgerAdmission, MonitorStore, NotificationStore};
use gardenwatch::Engine;

pub const CRON_SECRET: &str = "test-cron-secret";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 6, 0, 0).unwrap()
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct StoreState {
    pub profiles: Vec<UserProfile>,
    pub gardens: Vec<Garden>,
    pub rules: Vec<Rule>,
    pub hazards: Vec<Hazard>,
    pub reports: Vec<HazardReport>,
    pub insight_subscriptions: Vec<InsightSubscription>,
    pub alerts: Vec<AlertCandidate>,
    pub tasks: Vec<TaskCandidate>,
    pub history: Vec<(Uuid, DailyWeatherSummary)>,
    pub fired: Vec<(Uuid, DateTime<Utc>)>,
    pub ledger: HashSet<(Uuid, String)>,
    pub push_subscriptions: Vec<PushSubscription>,
    /// Makes every ledger insert fail
    pub ledger_down: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.with(|s| s.profiles.iter().find(|p| p.id == user_id).cloned()))
    }

    async fn get_garden(&self, garden_id: Uuid) -> AppResult<Option<Garden>> {
        Ok(self.with(|s| s.gardens.iter().find(|g| g.id == garden_id).cloned()))
    }

    async fn list_located_profiles(&self, limit: i64) -> AppResult<Vec<UserProfile>> {
        Ok(self.with(|s| {
            s.profiles
                .iter()
                .filter(|p| p.location.is_some())
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn list_enabled_rules(&self, limit: i64) -> AppResult<Vec<Rule>> {
        Ok(self.with(|s| {
            s.rules
                .iter()
                .filter(|r| r.enabled)
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn mark_rule_fired(&self, rule_id: Uuid, fired_at: DateTime<Utc>) -> AppResult<()> {
        self.with(|s| {
            s.fired.push((rule_id, fired_at));
            if let Some(rule) = s.rules.iter_mut().find(|r| r.id == rule_id) {
                rule.last_fired_at = Some(fired_at);
            }
        });
        Ok(())
    }

    async fn list_hazards(&self) -> AppResult<Vec<Hazard>> {
        Ok(self.with(|s| s.hazards.clone()))
    }

    async fn list_recent_reports(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<HazardReport>> {
        Ok(self.with(|s| {
            s.reports
                .iter()
                .filter(|r| r.created_at >= since && r.status.is_visible())
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn count_reports_by_category(
        &self,
        window: TimeWindow,
        bbox: Option<BoundingBox>,
    ) -> AppResult<Vec<CategoryCount>> {
        Ok(self.with(|s| {
            let mut counts: BTreeMap<String, i64> = BTreeMap::new();
            for report in &s.reports {
                if !report.status.is_visible() || !window.contains(report.created_at) {
                    continue;
                }
                if bbox.is_some_and(|b| !b.contains(&report.location)) {
                    continue;
                }
                let category = normalize_category(report.category.as_deref());
                *counts.entry(category).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(category, count)| CategoryCount { category, count })
                .collect()
        }))
    }

    async fn list_active_insight_subscriptions(
        &self,
        limit: i64,
    ) -> AppResult<Vec<InsightSubscription>> {
        Ok(self.with(|s| {
            s.insight_subscriptions
                .iter()
                .filter(|sub| sub.active)
                .take(limit as usize)
                .cloned()
                .collect()
        }))
    }

    async fn upsert_alerts(&self, alerts: &[AlertCandidate]) -> AppResult<u64> {
        Ok(self.with(|s| {
            let mut inserted = 0;
            for alert in alerts {
                let exists = s
                    .alerts
                    .iter()
                    .any(|a| a.user_id == alert.user_id && a.alert_key == alert.alert_key);
                if !exists {
                    s.alerts.push(alert.clone());
                    inserted += 1;
                }
            }
            inserted
        }))
    }

    async fn upsert_tasks(&self, tasks: &[TaskCandidate]) -> AppResult<u64> {
        Ok(self.with(|s| {
            let mut inserted = 0;
            for task in tasks {
                if !s.tasks.iter().any(|t| t.identity() == task.identity()) {
                    s.tasks.push(task.clone());
                    inserted += 1;
                }
            }
            inserted
        }))
    }

    async fn upsert_weather_history(
        &self,
        user_id: Uuid,
        summary: &DailyWeatherSummary,
    ) -> AppResult<bool> {
        Ok(self.with(|s| {
            let exists = s
                .history
                .iter()
                .any(|(u, h)| *u == user_id && h.observed_on == summary.observed_on);
            if !exists {
                s.history.push((user_id, summary.clone()));
            }
            !exists
        }))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn claim_dedup(&self, user_id: Uuid, claim: &DedupClaim) -> AppResult<LedgerAdmission> {
        self.with(|s| {
            if s.ledger_down {
                return Err(AppError::PersistenceFailure("ledger unavailable".into()));
            }
            if s.ledger.insert((user_id, claim.key.clone())) {
                Ok(LedgerAdmission::Admitted)
            } else {
                Ok(LedgerAdmission::Duplicate)
            }
        })
    }

    async fn list_push_subscriptions(&self, user_id: Uuid) -> AppResult<Vec<PushSubscription>> {
        Ok(self.with(|s| {
            s.push_subscriptions
                .iter()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect()
        }))
    }

    async fn delete_push_subscription(&self, endpoint: &str) -> AppResult<bool> {
        Ok(self.with(|s| {
            let before = s.push_subscriptions.len();
            s.push_subscriptions.retain(|p| p.endpoint != endpoint);
            s.push_subscriptions.len() != before
        }))
    }
}

// ============================================================================
// Metric source
// ============================================================================

#[derive(Default)]
pub struct ScriptedMetrics {
    pub samples: Vec<MetricSample>,
    pub fail: bool,
    pub calls: Mutex<u32>,
}

impl ScriptedMetrics {
    pub fn with_samples(samples: Vec<MetricSample>) -> Arc<Self> {
        Arc::new(Self {
            samples,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }
}

#[async_trait]
impl MetricSource for ScriptedMetrics {
    async fn fetch_samples(
        &self,
        _location: GeoPoint,
        window: TimeWindow,
    ) -> AppResult<Vec<MetricSample>> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(AppError::UpstreamFailure("provider returned 503".into()));
        }
        Ok(self
            .samples
            .iter()
            .filter(|s| s.timestamp >= window.start && s.timestamp <= window.end)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Push transport
// ============================================================================

#[derive(Default)]
pub struct RecordingPush {
    /// Status to answer per endpoint; anything missing succeeds
    pub statuses: HashMap<String, u16>,
    pub delay: Option<Duration>,
    pub sent: Mutex<Vec<(String, PushPayload)>>,
}

impl RecordingPush {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_statuses(statuses: &[(&str, u16)]) -> Arc<Self> {
        Arc::new(Self {
            statuses: statuses
                .iter()
                .map(|(e, s)| (e.to_string(), *s))
                .collect(),
            ..Default::default()
        })
    }

    pub fn attempts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }
}

#[async_trait]
impl PushSender for RecordingPush {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushFailure> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.clone()));
        match self.statuses.get(&subscription.endpoint) {
            Some(status) => Err(PushFailure::status(*status, "push service error")),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn engine(
    store: Arc<MemoryStore>,
    metrics: Arc<ScriptedMetrics>,
    push: Arc<RecordingPush>,
) -> Engine {
    Engine {
        store: store.clone(),
        notifications: store,
        metrics,
        push,
        clock: Arc::new(FixedClock(now())),
    }
}

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://localhost/gardenwatch_test".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        weather: WeatherConfig {
            api_endpoint: "http://localhost:0".to_string(),
        },
        push: PushConfig {
            relay_url: "http://localhost:0".to_string(),
            api_key: String::new(),
            ttl_secs: 60,
        },
        cron: CronConfig {
            secret: CRON_SECRET.to_string(),
        },
        monitor: MonitorConfig::default(),
    }
}

pub fn profile(location: Option<GeoPoint>, watchlist: Vec<Uuid>, crops: Vec<Uuid>) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        location,
        watchlist,
        crops,
    }
}

pub fn subscription(user_id: Uuid, endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        p256dh: "p256dh-key".to_string(),
        auth: "auth-secret".to_string(),
        user_id,
    }
}
