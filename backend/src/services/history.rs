//! Daily weather history, the `weather-history` job

use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    previous_utc_day, DailyWeatherSummary, GeoPoint, MetricSample, TimeWindow, UserProfile,
};
use std::sync::Arc;
use std::time::Duration;

use super::batch::{run_batch, BatchLimits, BatchReport, UnitReport};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::external::MetricSource;
use crate::repository::MonitorStore;

/// Summarise the samples that fall inside the day's `[00:00, 24:00)` window
pub fn summarize_day(
    observed_on: NaiveDate,
    window: TimeWindow,
    samples: &[MetricSample],
) -> Option<DailyWeatherSummary> {
    let in_day: Vec<MetricSample> = samples
        .iter()
        .filter(|s| window.contains(s.timestamp))
        .cloned()
        .collect();
    DailyWeatherSummary::from_samples(observed_on, &in_day)
}

pub struct HistoryService {
    store: Arc<dyn MonitorStore>,
    metrics: Arc<dyn MetricSource>,
    clock: Arc<dyn Clock>,
    profile_batch_limit: i64,
}

impl HistoryService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        metrics: Arc<dyn MetricSource>,
        clock: Arc<dyn Clock>,
        profile_batch_limit: i64,
    ) -> Self {
        Self {
            store,
            metrics,
            clock,
            profile_batch_limit,
        }
    }

    /// Record yesterday's weather for every located user
    pub async fn run(&self, limits: BatchLimits) -> AppResult<BatchReport> {
        let now = self.clock.now();
        let profiles = self
            .store
            .list_located_profiles(self.profile_batch_limit)
            .await?;

        tracing::info!(profiles = profiles.len(), "Recording weather history");

        let report = run_batch("weather-history", profiles, limits, |profile| {
            self.record(profile, now, limits.unit_timeout)
        })
        .await;

        Ok(report)
    }

    async fn record(
        &self,
        profile: UserProfile,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> UnitReport {
        let Some(location) = profile.location else {
            return UnitReport::skipped();
        };

        let summary = match self.fetch_day(location, now, timeout).await {
            Ok(summary) => summary,
            Err(e @ AppError::DataUnavailable(_)) => {
                tracing::debug!(user_id = %profile.id, "{}", e);
                return UnitReport::skipped();
            }
            Err(e) => {
                tracing::warn!(user_id = %profile.id, "Weather history fetch failed: {}", e);
                return UnitReport::failed();
            }
        };

        match self.store.upsert_weather_history(profile.id, &summary).await {
            Ok(_) => UnitReport::processed(),
            Err(e) => {
                tracing::warn!(user_id = %profile.id, "Failed to store weather history: {}", e);
                UnitReport::failed()
            }
        }
    }

    /// Yesterday's summary at `location`; `DataUnavailable` for an empty day
    async fn fetch_day(
        &self,
        location: GeoPoint,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> AppResult<DailyWeatherSummary> {
        let (observed_on, window) = previous_utc_day(now);

        let samples = tokio::time::timeout(timeout, self.metrics.fetch_samples(location, window))
            .await
            .map_err(|_| AppError::UpstreamFailure("weather fetch timed out".to_string()))??;

        summarize_day(observed_on, window, &samples)
            .ok_or_else(|| AppError::DataUnavailable(format!("no samples for {}", observed_on)))
    }
}
