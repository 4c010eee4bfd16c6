//! Hazard proximity and seasonal risk detection, and the `hazard-scan` job

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use shared::{
    month_of, validate_risk_calendar, within_radius, AlertCandidate, AlertType, DedupClaim,
    GeoPoint, Hazard, HazardReport, PushPayload, TaskCandidate, TaskType, UserProfile,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::batch::{run_batch, BatchLimits, BatchReport, UnitReport, UnitStatus};
use super::dispatcher::NotificationDispatcher;
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::error::AppResult;
use crate::repository::MonitorStore;

const NEARBY_SEVERITY: i16 = 4;
const SEASONAL_SEVERITY: i16 = 3;

#[derive(Debug, Clone, Copy)]
pub struct ProximitySettings {
    pub radius_km: f64,
    pub lookback_days: u32,
    pub risk_threshold: u8,
    pub alert_validity_days: u32,
    pub report_batch_limit: i64,
    pub profile_batch_limit: i64,
}

impl From<&MonitorConfig> for ProximitySettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            radius_km: config.proximity_radius_km,
            lookback_days: config.report_lookback_days,
            risk_threshold: config.seasonal_risk_threshold,
            alert_validity_days: config.alert_validity_days,
            report_batch_limit: config.report_batch_limit,
            profile_batch_limit: config.profile_batch_limit,
        }
    }
}

/// Visible recent report locations grouped by hazard
#[derive(Debug, Default)]
pub struct ReportIndex {
    by_hazard: HashMap<Uuid, Vec<GeoPoint>>,
}

impl ReportIndex {
    /// Index visible reports created at or after `since`.
    /// Reports without a hazard cannot make anything "near".
    pub fn build(reports: &[HazardReport], since: DateTime<Utc>) -> Self {
        let mut by_hazard: HashMap<Uuid, Vec<GeoPoint>> = HashMap::new();
        for report in reports {
            if !report.status.is_visible() || report.created_at < since {
                continue;
            }
            if let Some(hazard_id) = report.hazard_id {
                by_hazard.entry(hazard_id).or_default().push(report.location);
            }
        }
        Self { by_hazard }
    }

    pub fn is_near(&self, hazard_id: Uuid, location: &GeoPoint, radius_km: f64) -> bool {
        self.by_hazard
            .get(&hazard_id)
            .is_some_and(|points| points.iter().any(|p| within_radius(p, location, radius_km)))
    }
}

/// Hazards relevant to a user.
///
/// An explicit watchlist wins; otherwise any hazard hosted by one of the
/// user's crops.
pub fn candidate_hazards<'a>(profile: &UserProfile, hazards: &'a [Hazard]) -> Vec<&'a Hazard> {
    if !profile.watchlist.is_empty() {
        hazards
            .iter()
            .filter(|h| profile.watchlist.contains(&h.id))
            .collect()
    } else if !profile.crops.is_empty() {
        hazards
            .iter()
            .filter(|h| h.hosts_any(&profile.crops))
            .collect()
    } else {
        Vec::new()
    }
}

/// Alerts and inspection tasks found for one user
#[derive(Debug, Default)]
pub struct HazardFindings {
    pub alerts: Vec<AlertCandidate>,
    pub tasks: Vec<TaskCandidate>,
}

impl HazardFindings {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.tasks.is_empty()
    }
}

pub fn hazard_alert_key(hazard_id: Uuid, today: NaiveDate) -> String {
    format!("hazard:{}:{}", hazard_id, today)
}

/// Run the detector for one user at `now`
pub fn detect_for_user(
    profile: &UserProfile,
    hazards: &[Hazard],
    index: &ReportIndex,
    settings: &ProximitySettings,
    now: DateTime<Utc>,
) -> HazardFindings {
    let mut findings = HazardFindings::default();
    let Some(location) = profile.location else {
        return findings;
    };

    let month = month_of(now);
    let today = now.date_naive();
    let mut seen_tasks = HashSet::new();

    for hazard in candidate_hazards(profile, hazards) {
        let near = index.is_near(hazard.id, &location, settings.radius_km);
        let risk_level = hazard.risk_level(month);
        if !near && risk_level < settings.risk_threshold {
            continue;
        }

        let (alert_type, severity, title, message) = if near {
            (
                AlertType::HazardNearby,
                NEARBY_SEVERITY,
                format!("{} reported nearby", hazard.common_name),
                format!(
                    "{} ({}) was reported within {:.0} km in the last {} days. Check your plants for signs.",
                    hazard.common_name,
                    hazard.kind.as_str(),
                    settings.radius_km,
                    settings.lookback_days
                ),
            )
        } else {
            (
                AlertType::SeasonalRisk,
                SEASONAL_SEVERITY,
                format!("{} season", hazard.common_name),
                format!(
                    "Seasonal risk for {} ({}) is {}/5 this month. Inspect susceptible crops.",
                    hazard.common_name,
                    hazard.kind.as_str(),
                    risk_level
                ),
            )
        };

        findings.alerts.push(AlertCandidate {
            user_id: profile.id,
            alert_type,
            alert_key: hazard_alert_key(hazard.id, today),
            severity,
            title,
            message,
            hazard_id: Some(hazard.id),
            rule_id: None,
            valid_from: now,
            valid_to: now + ChronoDuration::days(i64::from(settings.alert_validity_days)),
        });

        for crop_id in profile.crops.iter().filter(|c| hazard.hosts(c)) {
            let task = TaskCandidate {
                user_id: profile.id,
                crop_id: *crop_id,
                task_type: TaskType::Other,
                due_date: today,
                title: format!("Inspect for {}", hazard.common_name),
                hazard_id: Some(hazard.id),
            };
            if seen_tasks.insert(task.identity()) {
                findings.tasks.push(task);
            }
        }
    }

    findings
}

// ============================================================================
// hazard-scan job
// ============================================================================

pub struct HazardService {
    store: Arc<dyn MonitorStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    settings: ProximitySettings,
}

impl HazardService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        settings: ProximitySettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            settings,
        }
    }

    pub async fn run(&self, limits: BatchLimits) -> AppResult<BatchReport> {
        let now = self.clock.now();
        let since = now - ChronoDuration::days(i64::from(self.settings.lookback_days));

        let (hazards, reports, profiles) = tokio::try_join!(
            self.store.list_hazards(),
            self.store.list_recent_reports(since, self.settings.report_batch_limit),
            self.store.list_located_profiles(self.settings.profile_batch_limit),
        )?;
        let hazards: Vec<Hazard> = hazards
            .into_iter()
            .filter(|h| match validate_risk_calendar(h) {
                Ok(()) => true,
                Err(msg) => {
                    tracing::warn!(hazard_id = %h.id, "Skipping hazard: {}", msg);
                    false
                }
            })
            .collect();
        let index = ReportIndex::build(&reports, since);

        tracing::info!(
            hazards = hazards.len(),
            reports = reports.len(),
            profiles = profiles.len(),
            "Scanning hazards"
        );

        let report = run_batch("hazard-scan", profiles, limits, |profile| {
            self.process_profile(profile, &hazards, &index, now)
        })
        .await;

        Ok(report)
    }

    async fn process_profile(
        &self,
        profile: UserProfile,
        hazards: &[Hazard],
        index: &ReportIndex,
        now: DateTime<Utc>,
    ) -> UnitReport {
        if profile.location.is_none() || !profile.has_interests() {
            return UnitReport::skipped();
        }

        let findings = detect_for_user(&profile, hazards, index, &self.settings, now);
        let mut unit = UnitReport::processed();
        if findings.is_empty() {
            return unit;
        }
        unit.triggered = findings.alerts.len() as u32;

        match self.store.upsert_alerts(&findings.alerts).await {
            Ok(inserted) => unit.alerts = inserted,
            Err(e) => {
                tracing::warn!(user_id = %profile.id, "Failed to store hazard alerts: {}", e);
                return UnitReport::failed();
            }
        }

        match self.store.upsert_tasks(&findings.tasks).await {
            Ok(inserted) => unit.tasks = inserted,
            Err(e) => {
                tracing::warn!(user_id = %profile.id, "Failed to store inspection tasks: {}", e);
                unit.status = UnitStatus::Failed;
            }
        }

        for alert in &findings.alerts {
            let payload = PushPayload::new(alert.title.clone(), alert.message.clone())
                .with_url("/alerts")
                .with_tag(alert.alert_key.clone());
            let claim = DedupClaim::new(alert.alert_key.clone(), alert.alert_type.as_str());
            match self.dispatcher.dispatch(profile.id, &payload, Some(&claim)).await {
                Ok(outcome) => unit.record_dispatch(&outcome),
                Err(e) => {
                    tracing::warn!(user_id = %profile.id, key = %alert.alert_key, "Hazard notification failed: {}", e);
                    unit.status = UnitStatus::Failed;
                }
            }
        }

        unit
    }
}
