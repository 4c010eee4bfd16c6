//! Report trend insights and the `insight-digest` job
//!
//! Counts reports per category in the last `N` days and in the `N` days
//! before that, then classifies each category's trend.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{
    classify_trend, clamp_insight_days, trend_pct, BoundingBox, CategoryCount, DedupClaim,
    Insight, InsightSeverity, InsightSubscription, PushPayload, TimeWindow,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::batch::{run_batch, BatchLimits, BatchReport, UnitReport};
use super::dispatcher::NotificationDispatcher;
use crate::clock::Clock;
use crate::error::AppResult;
use crate::repository::MonitorStore;

/// How many insights the summary endpoint returns
pub const SUMMARY_SIZE: usize = 6;

/// How many insight messages go into one digest body
const DIGEST_LINES: usize = 3;

const DIGEST_KIND: &str = "insight_digest";

fn trend_message(category: &str, recent: i64, previous: i64, pct: i64, days: u32) -> String {
    if pct > 0 {
        format!(
            "{} reports up {}% ({} vs {}) over the last {} days",
            category, pct, recent, previous, days
        )
    } else if pct < 0 {
        format!(
            "{} reports down {}% ({} vs {}) over the last {} days",
            category,
            pct.abs(),
            recent,
            previous,
            days
        )
    } else {
        format!(
            "{} reports steady at {} over the last {} days",
            category, recent, days
        )
    }
}

fn suggestion(severity: InsightSeverity) -> &'static str {
    match severity {
        InsightSeverity::High => "Inspect plants daily and act on the first signs.",
        InsightSeverity::Medium => "Check susceptible plants a few times this week.",
        InsightSeverity::Low => "Keep an eye out during routine checks.",
    }
}

/// Combine the two windows' counts into sorted insights.
///
/// Sorted by severity (high first), then recent count, then category.
pub fn build_insights(recent: &[CategoryCount], previous: &[CategoryCount], days: u32) -> Vec<Insight> {
    let mut counts: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for c in recent {
        counts.entry(c.category.as_str()).or_default().0 += c.count;
    }
    for c in previous {
        counts.entry(c.category.as_str()).or_default().1 += c.count;
    }

    let mut insights: Vec<Insight> = counts
        .into_iter()
        .map(|(category, (recent, previous))| {
            let pct = trend_pct(recent, previous);
            let severity = classify_trend(recent, pct);
            Insight {
                hazard: category.to_string(),
                recent,
                previous,
                trend_pct: pct,
                severity,
                message: trend_message(category, recent, previous, pct, days),
                suggestion: suggestion(severity).to_string(),
            }
        })
        .collect();

    insights.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.recent.cmp(&a.recent))
            .then_with(|| a.hazard.cmp(&b.hazard))
    });
    insights
}

/// Response of the insights endpoint
#[derive(Debug, Clone, Serialize)]
pub struct InsightSummary {
    pub days: u32,
    pub generated_at: DateTime<Utc>,
    pub insights: Vec<Insight>,
}

pub fn digest_key(subscription: &InsightSubscription, now: DateTime<Utc>) -> String {
    format!("insight:{}:{}", subscription.id, now.date_naive())
}

fn trend_word(pct: i64) -> &'static str {
    match pct.signum() {
        1 => "rising",
        -1 => "falling",
        _ => "steady",
    }
}

/// Push payload for the insights a subscription matched
pub fn digest_payload(matches: &[Insight]) -> PushPayload {
    let title = match matches {
        [only] => format!("{} activity is {}", only.hazard, trend_word(only.trend_pct)),
        _ => format!("{} hazard trends near you", matches.len()),
    };
    let body = matches
        .iter()
        .take(DIGEST_LINES)
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    PushPayload::new(title, body).with_url("/insights")
}

pub struct InsightService {
    store: Arc<dyn MonitorStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    subscription_batch_limit: i64,
}

impl InsightService {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        subscription_batch_limit: i64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            subscription_batch_limit,
        }
    }

    /// All insights for an optional area over `days` (clamped to 1..=30)
    pub async fn compute(
        &self,
        bbox: Option<BoundingBox>,
        days: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Insight>> {
        let days = clamp_insight_days(days);
        let recent_window = TimeWindow::trailing_days(now, days);
        let previous_window = recent_window.preceding();

        let (recent, previous) = tokio::try_join!(
            self.store.count_reports_by_category(recent_window, bbox),
            self.store.count_reports_by_category(previous_window, bbox),
        )?;

        Ok(build_insights(&recent, &previous, days))
    }

    /// Top insights for the read endpoint
    pub async fn summary(&self, bbox: Option<BoundingBox>, days: i64) -> AppResult<InsightSummary> {
        let now = self.clock.now();
        let mut insights = self.compute(bbox, days, now).await?;
        insights.truncate(SUMMARY_SIZE);

        Ok(InsightSummary {
            days: clamp_insight_days(days),
            generated_at: now,
            insights,
        })
    }

    /// Push one digest per active subscription that matches anything
    pub async fn run_digest(&self, limits: BatchLimits) -> AppResult<BatchReport> {
        let now = self.clock.now();
        let subscriptions = self
            .store
            .list_active_insight_subscriptions(self.subscription_batch_limit)
            .await?;

        tracing::info!(subscriptions = subscriptions.len(), "Building insight digests");

        let report = run_batch("insight-digest", subscriptions, limits, |subscription| {
            self.process_subscription(subscription, now)
        })
        .await;

        Ok(report)
    }

    async fn process_subscription(
        &self,
        subscription: InsightSubscription,
        now: DateTime<Utc>,
    ) -> UnitReport {
        if !subscription.active {
            return UnitReport::skipped();
        }

        let insights = match self
            .compute(subscription.bbox, i64::from(subscription.days), now)
            .await
        {
            Ok(insights) => insights,
            Err(e) => {
                tracing::warn!(subscription_id = %subscription.id, "Failed to compute insights: {}", e);
                return UnitReport::failed();
            }
        };

        let matches: Vec<Insight> = insights
            .into_iter()
            .filter(|i| subscription.matches(i))
            .collect();

        let mut unit = UnitReport::processed();
        if matches.is_empty() {
            return unit;
        }
        unit.triggered = matches.len() as u32;

        let payload = digest_payload(&matches);
        let claim = DedupClaim::new(digest_key(&subscription, now), DIGEST_KIND);
        match self
            .dispatcher
            .dispatch(subscription.user_id, &payload, Some(&claim))
            .await
        {
            Ok(outcome) => unit.record_dispatch(&outcome),
            Err(e) => {
                tracing::warn!(subscription_id = %subscription.id, "Insight digest failed: {}", e);
                return UnitReport::failed();
            }
        }

        unit
    }
}
