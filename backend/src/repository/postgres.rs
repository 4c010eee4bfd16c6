//! PostgreSQL implementation of the monitor stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use shared::{
    normalize_category, AlertCandidate, BoundingBox, CategoryCount, DailyWeatherSummary,
    DedupClaim, GeoPoint, Garden, Hazard, HazardKind, HazardReport, InsightSubscription,
    PushSubscription, ReportStatus, Rule, RuleCondition, RuleScope, TaskCandidate, TimeWindow,
    UserProfile,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{LedgerAdmission, MonitorStore, NotificationStore};
use crate::error::{AppError, AppResult};

/// Store backed by the application database
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn write_failed(operation: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::PersistenceFailure(format!("{} failed: {}", operation, e))
}

fn point(latitude: Option<f64>, longitude: Option<f64>) -> Option<GeoPoint> {
    match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    latitude: Option<f64>,
    longitude: Option<f64>,
    watchlist: Vec<Uuid>,
    crops: Vec<Uuid>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        UserProfile {
            id: row.id,
            location: point(row.latitude, row.longitude),
            watchlist: row.watchlist,
            crops: row.crops,
        }
    }
}

#[derive(Debug, FromRow)]
struct GardenRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    user_id: Option<Uuid>,
    garden_id: Option<Uuid>,
    enabled: bool,
    condition: JsonValue,
    last_fired_at: Option<DateTime<Utc>>,
}

impl TryFrom<RuleRow> for Rule {
    type Error = serde_json::Error;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let condition: RuleCondition = serde_json::from_value(row.condition)?;
        Ok(Rule {
            id: row.id,
            name: row.name,
            scope: RuleScope::from_columns(row.user_id, row.garden_id),
            enabled: row.enabled,
            condition,
            last_fired_at: row.last_fired_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HazardRow {
    id: Uuid,
    kind: String,
    common_name: String,
    seasonal_risk: JsonValue,
    host_crops: Vec<Uuid>,
}

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    hazard_id: Option<Uuid>,
    category: Option<String>,
    latitude: f64,
    longitude: f64,
    severity: i16,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<ReportRow> for HazardReport {
    fn from(row: ReportRow) -> Self {
        HazardReport {
            id: row.id,
            hazard_id: row.hazard_id,
            category: row.category,
            location: GeoPoint::new(row.latitude, row.longitude),
            severity: row.severity,
            status: ReportStatus::from_str(&row.status),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct InsightSubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    min_lat: Option<f64>,
    min_lon: Option<f64>,
    max_lat: Option<f64>,
    max_lon: Option<f64>,
    threshold_pct: i32,
    min_recent: i32,
    days: i32,
    hazards: Vec<String>,
    active: bool,
}

impl From<InsightSubscriptionRow> for InsightSubscription {
    fn from(row: InsightSubscriptionRow) -> Self {
        let bbox = match (row.min_lat, row.min_lon, row.max_lat, row.max_lon) {
            (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) => {
                Some(BoundingBox::new(min_lat, min_lon, max_lat, max_lon))
            }
            _ => None,
        };
        InsightSubscription {
            id: row.id,
            user_id: row.user_id,
            bbox,
            threshold_pct: i64::from(row.threshold_pct),
            min_recent: i64::from(row.min_recent),
            days: row.days.max(0) as u32,
            hazards: row.hazards,
            active: row.active,
        }
    }
}

#[derive(Debug, FromRow)]
struct PushSubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
    user_id: Uuid,
}

// ============================================================================
// Monitor store
// ============================================================================

#[async_trait]
impl MonitorStore for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, latitude, longitude, watchlist, crops FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    async fn get_garden(&self, garden_id: Uuid) -> AppResult<Option<Garden>> {
        let row = sqlx::query_as::<_, GardenRow>(
            "SELECT id, owner_id, name, latitude, longitude FROM gardens WHERE id = $1",
        )
        .bind(garden_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|g| Garden {
            id: g.id,
            owner_id: g.owner_id,
            name: g.name,
            location: point(g.latitude, g.longitude),
        }))
    }

    async fn list_located_profiles(&self, limit: i64) -> AppResult<Vec<UserProfile>> {
        let rows = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, latitude, longitude, watchlist, crops
            FROM profiles
            WHERE latitude IS NOT NULL AND longitude IS NOT NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn list_enabled_rules(&self, limit: i64) -> AppResult<Vec<Rule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT id, name, user_id, garden_id, enabled, condition, last_fired_at
            FROM rules
            WHERE enabled = true
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        // A malformed condition disables one rule, not the job
        let rules = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match Rule::try_from(row) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        tracing::warn!(rule_id = %id, "Skipping rule with unreadable condition: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(rules)
    }

    async fn mark_rule_fired(&self, rule_id: Uuid, fired_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE rules SET last_fired_at = $2 WHERE id = $1")
            .bind(rule_id)
            .bind(fired_at)
            .execute(&self.db)
            .await
            .map_err(write_failed("Marking rule fired"))?;

        Ok(())
    }

    async fn list_hazards(&self) -> AppResult<Vec<Hazard>> {
        let rows = sqlx::query_as::<_, HazardRow>(
            "SELECT id, kind, common_name, seasonal_risk, host_crops FROM hazards",
        )
        .fetch_all(&self.db)
        .await?;

        let hazards = rows
            .into_iter()
            .filter_map(|row| {
                let Some(kind) = HazardKind::from_str(&row.kind) else {
                    tracing::warn!(hazard_id = %row.id, "Skipping hazard with unknown kind {}", row.kind);
                    return None;
                };
                let seasonal_risk = serde_json::from_value(row.seasonal_risk).unwrap_or_else(|e| {
                    tracing::warn!(hazard_id = %row.id, "Unreadable risk calendar, assuming zero: {}", e);
                    Default::default()
                });
                Some(Hazard {
                    id: row.id,
                    kind,
                    common_name: row.common_name,
                    seasonal_risk,
                    host_crops: row.host_crops,
                })
            })
            .collect();

        Ok(hazards)
    }

    async fn list_recent_reports(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<HazardReport>> {
        let rows = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT id, hazard_id, category, latitude, longitude, severity, status, created_at
            FROM hazard_reports
            WHERE created_at >= $1
              AND status NOT IN ('hidden', 'flagged')
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(HazardReport::from).collect())
    }

    async fn count_reports_by_category(
        &self,
        window: TimeWindow,
        bbox: Option<BoundingBox>,
    ) -> AppResult<Vec<CategoryCount>> {
        let rows = sqlx::query_as::<_, (Option<String>, i64)>(
            r#"
            SELECT NULLIF(TRIM(r.category), '') AS category,
                   COUNT(*)::BIGINT AS count
            FROM hazard_reports r
            WHERE r.created_at >= $1
              AND r.created_at < $2
              AND r.status NOT IN ('hidden', 'flagged')
              AND ($3::DOUBLE PRECISION IS NULL
                   OR (r.latitude BETWEEN $3 AND $5 AND r.longitude BETWEEN $4 AND $6))
            GROUP BY 1
            "#,
        )
        .bind(window.start)
        .bind(window.end)
        .bind(bbox.map(|b| b.min_lat))
        .bind(bbox.map(|b| b.min_lon))
        .bind(bbox.map(|b| b.max_lat))
        .bind(bbox.map(|b| b.max_lon))
        .fetch_all(&self.db)
        .await?;

        // Categories differing only in case collapse here
        let mut counts: Vec<CategoryCount> = Vec::new();
        for (category, count) in rows {
            let category = normalize_category(category.as_deref());
            match counts.iter_mut().find(|c| c.category == category) {
                Some(existing) => existing.count += count,
                None => counts.push(CategoryCount { category, count }),
            }
        }

        Ok(counts)
    }

    async fn list_active_insight_subscriptions(
        &self,
        limit: i64,
    ) -> AppResult<Vec<InsightSubscription>> {
        let rows = sqlx::query_as::<_, InsightSubscriptionRow>(
            r#"
            SELECT id, user_id, min_lat, min_lon, max_lat, max_lon,
                   threshold_pct, min_recent, days, hazards, active
            FROM insight_subscriptions
            WHERE active = true
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(InsightSubscription::from).collect())
    }

    async fn upsert_alerts(&self, alerts: &[AlertCandidate]) -> AppResult<u64> {
        let mut inserted = 0;
        for alert in alerts {
            let result = sqlx::query(
                r#"
                INSERT INTO alerts (
                    user_id, alert_type, alert_key, severity, title, message,
                    hazard_id, rule_id, valid_from, valid_to
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (user_id, alert_key) DO NOTHING
                "#,
            )
            .bind(alert.user_id)
            .bind(alert.alert_type.as_str())
            .bind(&alert.alert_key)
            .bind(alert.severity)
            .bind(&alert.title)
            .bind(&alert.message)
            .bind(alert.hazard_id)
            .bind(alert.rule_id)
            .bind(alert.valid_from)
            .bind(alert.valid_to)
            .execute(&self.db)
            .await
            .map_err(write_failed("Alert upsert"))?;

            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    async fn upsert_tasks(&self, tasks: &[TaskCandidate]) -> AppResult<u64> {
        let mut inserted = 0;
        for task in tasks {
            let result = sqlx::query(
                r#"
                INSERT INTO tasks (user_id, crop_id, task_type, due_date, title, hazard_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (user_id, crop_id, task_type, due_date) DO NOTHING
                "#,
            )
            .bind(task.user_id)
            .bind(task.crop_id)
            .bind(task.task_type.as_str())
            .bind(task.due_date)
            .bind(&task.title)
            .bind(task.hazard_id)
            .execute(&self.db)
            .await
            .map_err(write_failed("Task upsert"))?;

            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    async fn upsert_weather_history(
        &self,
        user_id: Uuid,
        summary: &DailyWeatherSummary,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO weather_history (
                user_id, observed_on, min_temp_c, total_precip_mm, max_wind_ms, sample_count
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, observed_on) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(summary.observed_on)
        .bind(summary.min_temp_c)
        .bind(summary.total_precip_mm)
        .bind(summary.max_wind_ms)
        .bind(summary.sample_count)
        .execute(&self.db)
        .await
        .map_err(write_failed("Weather history upsert"))?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Notification store
// ============================================================================

#[async_trait]
impl NotificationStore for PgStore {
    async fn claim_dedup(&self, user_id: Uuid, claim: &DedupClaim) -> AppResult<LedgerAdmission> {
        let result = sqlx::query(
            "INSERT INTO notification_dedup (user_id, dedup_key, kind) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(&claim.key)
        .bind(&claim.kind)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(LedgerAdmission::Admitted),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(LedgerAdmission::Duplicate)
            }
            Err(e) => Err(AppError::PersistenceFailure(format!(
                "Dedup ledger insert failed: {}",
                e
            ))),
        }
    }

    async fn list_push_subscriptions(&self, user_id: Uuid) -> AppResult<Vec<PushSubscription>> {
        let rows = sqlx::query_as::<_, PushSubscriptionRow>(
            "SELECT endpoint, p256dh, auth, user_id FROM push_subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PushSubscription {
                endpoint: row.endpoint,
                p256dh: row.p256dh,
                auth: row.auth,
                user_id: row.user_id,
            })
            .collect())
    }

    async fn delete_push_subscription(&self, endpoint: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = $1")
            .bind(endpoint)
            .execute(&self.db)
            .await
            .map_err(write_failed("Push subscription delete"))?;

        Ok(result.rows_affected() > 0)
    }
}
