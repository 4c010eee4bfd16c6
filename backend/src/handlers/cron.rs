//! HTTP handlers for the scheduler-triggered batch jobs
//!
//! Authentication happens in the `cron_auth` route layer. Each handler runs
//! one job to completion and returns its counters.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use crate::error::AppResult;
use crate::services::{BatchLimits, BatchReport};
use crate::AppState;

/// Query parameters shared by the cron routes
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CronQuery {
    /// Override the configured time budget for this run
    #[validate(range(max = 600_000))]
    pub budget_ms: Option<u64>,
}

fn batch_limits(state: &AppState, query: &CronQuery) -> AppResult<BatchLimits> {
    query.validate()?;
    let limits = BatchLimits::from_config(&state.config.monitor);
    Ok(match query.budget_ms {
        Some(ms) => limits.with_budget(Duration::from_millis(ms)),
        None => limits,
    })
}

/// Evaluate weather threshold rules
pub async fn weather_rules(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> AppResult<Json<BatchReport>> {
    let limits = batch_limits(&state, &query)?;
    let service = state.engine.rule_service(&state.config.monitor);
    let report = service.run(limits).await?;
    Ok(Json(report))
}

/// Proximity and seasonal risk scan
pub async fn hazard_scan(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> AppResult<Json<BatchReport>> {
    let limits = batch_limits(&state, &query)?;
    let service = state.engine.hazard_service(&state.config.monitor);
    let report = service.run(limits).await?;
    Ok(Json(report))
}

/// Push insight digests to matching subscriptions
pub async fn insight_digest(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> AppResult<Json<BatchReport>> {
    let limits = batch_limits(&state, &query)?;
    let service = state.engine.insight_service(&state.config.monitor);
    let report = service.run_digest(limits).await?;
    Ok(Json(report))
}

/// Record yesterday's weather per user
pub async fn weather_history(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
) -> AppResult<Json<BatchReport>> {
    let limits = batch_limits(&state, &query)?;
    let service = state.engine.history_service(&state.config.monitor);
    let report = service.run(limits).await?;
    Ok(Json(report))
}
