//! Report trend insight tests
//!
//! Tests for insights including:
//! - Trend percentage and severity classification
//! - Window and area filtering of report counts
//! - Digest matching and once-per-day delivery

mod common;

use chrono::Duration as ChronoDuration;
use common::*;
use proptest::prelude::*;
use shared::{
    classify_trend, trend_pct, BoundingBox, GeoPoint, Hazard, HazardKind, HazardReport,
    InsightSeverity, InsightSubscription, ReportStatus,
};
use std::collections::BTreeMap;
use uuid::Uuid;

use gardenwatch::config::MonitorConfig;
use gardenwatch::services::insights::SUMMARY_SIZE;
use gardenwatch::services::BatchLimits;

fn report(category: &str, location: GeoPoint, hours_ago: i64) -> HazardReport {
    HazardReport {
        id: Uuid::new_v4(),
        hazard_id: None,
        category: Some(category.to_string()),
        location,
        severity: 1,
        status: ReportStatus::Active,
        created_at: now() - ChronoDuration::hours(hours_ago),
    }
}

/// `recent` reports in the last 7 days and `previous` in the 7 days before
fn seed(store: &MemoryStore, category: &str, recent: usize, previous: usize) {
    let here = GeoPoint::new(45.0, 5.0);
    store.with(|s| {
        for i in 0..recent {
            s.reports.push(report(category, here, 1 + i as i64));
        }
        for i in 0..previous {
            s.reports.push(report(category, here, 24 * 7 + 1 + i as i64));
        }
    });
}

fn digest_subscription(
    user_id: Uuid,
    threshold_pct: i64,
    min_recent: i64,
    hazards: &[&str],
) -> InsightSubscription {
    InsightSubscription {
        id: Uuid::new_v4(),
        user_id,
        bbox: None,
        threshold_pct,
        min_recent,
        days: 7,
        hazards: hazards.iter().map(|h| h.to_string()).collect(),
        active: true,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_trend_cases() {
        assert_eq!(trend_pct(0, 0), 0);
        assert_eq!(classify_trend(0, 0), InsightSeverity::Low);
        assert_eq!(trend_pct(5, 0), 100);
        assert_eq!(trend_pct(15, 10), 50);
    }

    #[tokio::test]
    async fn test_compute_counts_both_windows() {
        let store = MemoryStore::new();
        seed(&store, "Aphid", 15, 10);
        seed(&store, "slug", 2, 2);
        let engine = engine(store.clone(), ScriptedMetrics::with_samples(vec![]), RecordingPush::ok());
        let service = engine.insight_service(&MonitorConfig::default());

        let insights = service.compute(None, 7, now()).await.unwrap();

        assert_eq!(insights.len(), 2);
        let aphid = &insights[0];
        assert_eq!(aphid.hazard, "aphid");
        assert_eq!(aphid.recent, 15);
        assert_eq!(aphid.previous, 10);
        assert_eq!(aphid.trend_pct, 50);
        assert_eq!(aphid.severity, InsightSeverity::Medium);
        assert_eq!(insights[1].hazard, "slug");
        assert_eq!(insights[1].severity, InsightSeverity::Low);
    }

    #[tokio::test]
    async fn test_hidden_reports_and_other_areas_excluded() {
        let store = MemoryStore::new();
        let inside = GeoPoint::new(45.0, 5.0);
        let outside = GeoPoint::new(10.0, 100.0);
        store.with(|s| {
            s.reports.push(report("aphid", inside, 2));
            s.reports.push(report("aphid", outside, 2));
            let mut hidden = report("aphid", inside, 2);
            hidden.status = ReportStatus::Hidden;
            s.reports.push(hidden);
            let mut flagged = report("aphid", inside, 2);
            flagged.status = ReportStatus::Flagged;
            s.reports.push(flagged);
        });
        let engine = engine(store.clone(), ScriptedMetrics::with_samples(vec![]), RecordingPush::ok());
        let service = engine.insight_service(&MonitorConfig::default());
        let bbox = BoundingBox::new(40.0, 0.0, 50.0, 10.0);

        let insights = service.compute(Some(bbox), 7, now()).await.unwrap();

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].recent, 1);
    }

    #[tokio::test]
    async fn test_missing_category_is_unknown() {
        let store = MemoryStore::new();
        let aphid = Hazard {
            id: Uuid::new_v4(),
            kind: HazardKind::Pest,
            common_name: "Aphid".to_string(),
            seasonal_risk: BTreeMap::new(),
            host_crops: vec![],
        };
        store.with(|s| {
            let mut blank = report("  ", GeoPoint::new(45.0, 5.0), 2);
            blank.category = None;
            s.reports.push(blank);

            // Linked to a named hazard but uncategorised
            let mut linked = report("", GeoPoint::new(45.0, 5.0), 3);
            linked.category = None;
            linked.hazard_id = Some(aphid.id);
            s.reports.push(linked);

            let mut whitespace = report("   ", GeoPoint::new(45.0, 5.0), 4);
            whitespace.hazard_id = Some(aphid.id);
            s.reports.push(whitespace);

            s.hazards.push(aphid);
        });
        let engine = engine(store.clone(), ScriptedMetrics::with_samples(vec![]), RecordingPush::ok());

        let insights = engine
            .insight_service(&MonitorConfig::default())
            .compute(None, 7, now())
            .await
            .unwrap();

        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].hazard, "unknown");
        assert_eq!(insights[0].recent, 3);
    }

    #[tokio::test]
    async fn test_summary_is_top_six_and_clamps_days() {
        let store = MemoryStore::new();
        for (i, name) in ["a", "b", "c", "d", "e", "f", "g", "h"].iter().enumerate() {
            seed(&store, name, i + 1, 1);
        }
        let engine = engine(store.clone(), ScriptedMetrics::with_samples(vec![]), RecordingPush::ok());
        let service = engine.insight_service(&MonitorConfig::default());

        let summary = service.summary(None, 7).await.unwrap();
        assert_eq!(summary.insights.len(), SUMMARY_SIZE);
        assert_eq!(summary.generated_at, now());

        assert_eq!(service.summary(None, 90).await.unwrap().days, 30);
        assert_eq!(service.summary(None, 0).await.unwrap().days, 1);
    }

    #[tokio::test]
    async fn test_digest_sent_only_to_matching_subscriptions() {
        let store = MemoryStore::new();
        // 8 vs 5 is +60%
        seed(&store, "aphid", 8, 5);
        let matching = Uuid::new_v4();
        let strict = Uuid::new_v4();
        store.with(|s| {
            s.insight_subscriptions.push(digest_subscription(matching, 50, 5, &["Aphid"]));
            s.insight_subscriptions.push(digest_subscription(strict, 70, 5, &["aphid"]));
            s.push_subscriptions.push(subscription(matching, "https://push.example/match"));
            s.push_subscriptions.push(subscription(strict, "https://push.example/strict"));
        });
        let push = RecordingPush::ok();
        let engine = engine(store.clone(), ScriptedMetrics::with_samples(vec![]), push.clone());
        let service = engine.insight_service(&MonitorConfig::default());
        let limits = BatchLimits::from_config(&MonitorConfig::default());

        let first = service.run_digest(limits).await.unwrap();
        let second = service.run_digest(limits).await.unwrap();

        assert_eq!(first.processed, 2);
        assert_eq!(first.notified, 1);
        assert_eq!(second.notified, 0);
        assert_eq!(second.deduped, 1);
        assert_eq!(push.attempts(), vec!["https://push.example/match".to_string()]);

        let sent = push.sent.lock().unwrap();
        assert!(sent[0].1.body.contains("aphid reports up 60%"));
    }

    #[tokio::test]
    async fn test_inactive_subscriptions_ignored() {
        let store = MemoryStore::new();
        seed(&store, "aphid", 10, 1);
        let user = Uuid::new_v4();
        store.with(|s| {
            let mut sub = digest_subscription(user, 0, 0, &[]);
            sub.active = false;
            s.insight_subscriptions.push(sub);
            s.push_subscriptions.push(subscription(user, "https://push.example/off"));
        });
        let push = RecordingPush::ok();
        let engine = engine(store.clone(), ScriptedMetrics::with_samples(vec![]), push.clone());

        let report = engine
            .insight_service(&MonitorConfig::default())
            .run_digest(BatchLimits::from_config(&MonitorConfig::default()))
            .await
            .unwrap();

        assert_eq!(report.processed + report.skipped + report.failed, 0);
        assert!(push.attempts().is_empty());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #[test]
        fn prop_trend_sign_follows_change(recent in 0i64..1000, previous in 0i64..1000) {
            // Small relative changes round to zero
            let pct = trend_pct(recent, previous);
            if recent >= previous {
                prop_assert!(pct >= 0);
            } else {
                prop_assert!(pct <= 0);
            }
            if recent == previous {
                prop_assert_eq!(pct, 0);
            }
        }

        #[test]
        fn prop_severity_monotonic_in_recent(recent in 0i64..100, extra in 0i64..100, pct in -100i64..300) {
            prop_assert!(classify_trend(recent + extra, pct) >= classify_trend(recent, pct));
        }

        #[test]
        fn prop_high_volume_is_always_high(recent in 20i64..10_000, pct in -100i64..300) {
            prop_assert_eq!(classify_trend(recent, pct), InsightSeverity::High);
        }
    }
}
