//! HTTP surface tests
//!
//! Drives the router with in-memory stores behind it:
//! - Cron secret handling
//! - Budget override and deadline reporting
//! - Weather history and the insights read endpoint

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use common::*;
use serde_json::Value;
use shared::{GeoPoint, MetricSample};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

use gardenwatch::{create_app, AppState};

fn app(store: Arc<MemoryStore>, metrics: Arc<ScriptedMetrics>) -> Router {
    let config = test_config();
    let db = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database.url)
        .unwrap();

    create_app(AppState {
        db,
        config: Arc::new(config),
        engine: engine(store, metrics, RecordingPush::ok()),
    })
}

async fn get(app: Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn located_store(users: usize) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.with(|s| {
        for _ in 0..users {
            s.profiles
                .push(profile(Some(GeoPoint::new(45.0, 5.0)), vec![], vec![]));
        }
    });
    store
}

/// Hourly samples across 2024-06-14, the day before `now()`
fn yesterday_samples() -> Vec<MetricSample> {
    let start = Utc.with_ymd_and_hms(2024, 6, 14, 0, 0, 0).unwrap();
    (0..24)
        .map(|h| {
            MetricSample::new(
                start + ChronoDuration::hours(h),
                Some(10.0 + h as f64 / 2.0),
                Some(if h < 4 { 0.5 } else { 0.0 }),
                Some(2.0),
            )
        })
        .collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let app = app(MemoryStore::new(), ScriptedMetrics::with_samples(vec![]));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_cron_without_secret_is_unauthorized() {
        let app = app(located_store(1), ScriptedMetrics::with_samples(vec![]));

        let (status, body) = get(app, "/api/v1/cron/hazard-scan", &[]).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_cron_with_wrong_secret_is_unauthorized() {
        let app = app(located_store(1), ScriptedMetrics::with_samples(vec![]));

        let (status, _) = get(
            app,
            "/api/v1/cron/weather-rules",
            &[("x-cron-secret", "not-the-secret")],
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cron_accepts_bearer_token() {
        let app = app(located_store(2), ScriptedMetrics::with_samples(vec![]));
        let bearer = format!("Bearer {}", CRON_SECRET);

        let (status, body) = get(
            app,
            "/api/v1/cron/hazard-scan",
            &[("authorization", bearer.as_str())],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["job"], "hazard-scan");
        // Located but no watchlist or crops
        assert_eq!(body["skipped"], 2);
    }

    #[tokio::test]
    async fn test_cron_accepts_query_secret() {
        let app = app(MemoryStore::new(), ScriptedMetrics::with_samples(vec![]));
        let uri = format!("/api/v1/cron/insight-digest?secret={}", CRON_SECRET);

        let (status, body) = get(app, &uri, &[]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["processed"], 0);
    }

    #[tokio::test]
    async fn test_zero_budget_reports_deadline() {
        let app = app(located_store(3), ScriptedMetrics::with_samples(yesterday_samples()));

        let (status, body) = get(
            app,
            "/api/v1/cron/weather-history?budget_ms=0",
            &[("x-cron-secret", CRON_SECRET)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deadline_hit"], true);
        assert_eq!(body["skipped"], 3);
        assert_eq!(body["processed"], 0);
    }

    #[tokio::test]
    async fn test_oversized_budget_rejected() {
        let app = app(located_store(1), ScriptedMetrics::with_samples(vec![]));

        let (status, body) = get(
            app,
            "/api/v1/cron/weather-history?budget_ms=900000",
            &[("x-cron-secret", CRON_SECRET)],
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "budget_ms");
    }

    #[tokio::test]
    async fn test_weather_history_records_yesterday_once() {
        let store = located_store(1);
        let metrics = ScriptedMetrics::with_samples(yesterday_samples());
        let headers = [("x-cron-secret", CRON_SECRET)];

        let (status, body) = get(
            app(store.clone(), metrics.clone()),
            "/api/v1/cron/weather-history",
            &headers,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 1);

        let (status, _) = get(
            app(store.clone(), metrics),
            "/api/v1/cron/weather-history",
            &headers,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let history = store.with(|s| s.history.clone());
        assert_eq!(history.len(), 1);
        let (_, summary) = &history[0];
        assert_eq!(summary.observed_on.to_string(), "2024-06-14");
        assert_eq!(summary.sample_count, 24);
        assert_eq!(summary.min_temp_c, Some(10.0));
        assert!((summary.total_precip_mm.unwrap() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_weather_history_empty_day_is_skipped() {
        let store = located_store(2);
        let app = app(store.clone(), ScriptedMetrics::with_samples(vec![]));

        let (status, body) = get(
            app,
            "/api/v1/cron/weather-history",
            &[("x-cron-secret", CRON_SECRET)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["skipped"], 2);
        assert_eq!(body["failed"], 0);
        assert!(store.with(|s| s.history.is_empty()));
    }

    #[tokio::test]
    async fn test_weather_history_provider_failure_counts_failed() {
        let app = app(located_store(2), ScriptedMetrics::failing());

        let (status, body) = get(
            app,
            "/api/v1/cron/weather-history",
            &[("x-cron-secret", CRON_SECRET)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["failed"], 2);
    }

    #[tokio::test]
    async fn test_insights_endpoint_clamps_days() {
        let app = app(MemoryStore::new(), ScriptedMetrics::with_samples(vec![]));

        let (status, body) = get(app, "/api/v1/insights?days=90", &[]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"], 30);
        assert_eq!(body["insights"], Value::Array(vec![]));
    }

    #[tokio::test]
    async fn test_insights_endpoint_rejects_partial_bbox() {
        let app = app(MemoryStore::new(), ScriptedMetrics::with_samples(vec![]));

        let (status, body) = get(app, "/api/v1/insights?min_lat=40&max_lat=50", &[]).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "bbox");
    }
}
