//! Persistence seams for the monitor
//!
//! `MonitorStore` covers the entities the batch jobs read and the
//! ignore-on-conflict writes they make. `NotificationStore` covers the dedup
//! ledger and push subscriptions, which are the only state shared between
//! overlapping runs.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    AlertCandidate, BoundingBox, CategoryCount, DailyWeatherSummary, DedupClaim, Garden, Hazard,
    HazardReport, InsightSubscription, PushSubscription, Rule, TaskCandidate, TimeWindow,
    UserProfile,
};
use uuid::Uuid;

use crate::error::AppResult;

pub use postgres::PgStore;

#[async_trait]
pub trait MonitorStore: Send + Sync {
    // Profiles and gardens

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn get_garden(&self, garden_id: Uuid) -> AppResult<Option<Garden>>;

    /// Profiles that have a location, oldest first
    async fn list_located_profiles(&self, limit: i64) -> AppResult<Vec<UserProfile>>;

    // Rules

    async fn list_enabled_rules(&self, limit: i64) -> AppResult<Vec<Rule>>;

    async fn mark_rule_fired(&self, rule_id: Uuid, fired_at: DateTime<Utc>) -> AppResult<()>;

    // Hazards and reports

    async fn list_hazards(&self) -> AppResult<Vec<Hazard>>;

    /// Visible reports created at or after `since`
    async fn list_recent_reports(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<HazardReport>>;

    /// Visible report counts per normalised category within `[start, end)`
    async fn count_reports_by_category(
        &self,
        window: TimeWindow,
        bbox: Option<BoundingBox>,
    ) -> AppResult<Vec<CategoryCount>>;

    async fn list_active_insight_subscriptions(
        &self,
        limit: i64,
    ) -> AppResult<Vec<InsightSubscription>>;

    // Idempotent writes; each returns how many rows were new

    async fn upsert_alerts(&self, alerts: &[AlertCandidate]) -> AppResult<u64>;

    async fn upsert_tasks(&self, tasks: &[TaskCandidate]) -> AppResult<u64>;

    async fn upsert_weather_history(
        &self,
        user_id: Uuid,
        summary: &DailyWeatherSummary,
    ) -> AppResult<bool>;
}

/// Outcome of an insert-once into the dedup ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAdmission {
    Admitted,
    /// Another invocation already holds this key
    Duplicate,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Single atomic insert against the `(user_id, dedup_key)` unique constraint
    async fn claim_dedup(&self, user_id: Uuid, claim: &DedupClaim) -> AppResult<LedgerAdmission>;

    async fn list_push_subscriptions(&self, user_id: Uuid) -> AppResult<Vec<PushSubscription>>;

    /// Returns whether a row was removed
    async fn delete_push_subscription(&self, endpoint: &str) -> AppResult<bool>;
}
