//! Bounded-concurrency batch runner shared by the cron jobs
//!
//! Units run through `buffer_unordered` with a fixed width. The deadline is
//! checked when a unit starts, so a unit that is already running finishes
//! while everything not yet started is counted as skipped.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::MonitorConfig;

/// Width, per-call timeout and overall budget for one batch
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub concurrency: usize,
    pub unit_timeout: Duration,
    pub budget: Duration,
}

impl BatchLimits {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            unit_timeout: Duration::from_secs(config.unit_timeout_secs),
            budget: Duration::from_secs(config.batch_budget_secs),
        }
    }

    /// Replace the budget, e.g. from a `budget_ms` query parameter
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }
}

/// Aggregate counters returned by every cron job
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    pub ok: bool,
    pub job: String,
    pub processed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub triggered: u32,
    pub alerts: u64,
    pub tasks: u64,
    pub notified: u32,
    pub deduped: u32,
    pub pruned: u32,
    pub deadline_hit: bool,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, unit: UnitReport) {
        match unit.status {
            UnitStatus::Processed => self.processed += 1,
            UnitStatus::Skipped => self.skipped += 1,
            UnitStatus::Failed => self.failed += 1,
        }
        self.triggered += unit.triggered;
        self.alerts += unit.alerts;
        self.tasks += unit.tasks;
        self.notified += unit.notified;
        self.deduped += unit.deduped;
        self.pruned += unit.pruned;
    }

    pub fn finish(mut self, started: Instant) -> Self {
        self.ok = true;
        self.elapsed_ms = started.elapsed().as_millis() as u64;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnitStatus {
    #[default]
    Processed,
    Skipped,
    Failed,
}

/// Counters for one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub status: UnitStatus,
    pub triggered: u32,
    pub alerts: u64,
    pub tasks: u64,
    pub notified: u32,
    pub deduped: u32,
    pub pruned: u32,
}

impl UnitReport {
    pub fn processed() -> Self {
        Self::default()
    }

    pub fn skipped() -> Self {
        Self {
            status: UnitStatus::Skipped,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            status: UnitStatus::Failed,
            ..Default::default()
        }
    }

    /// Fold a dispatch result into the counters
    pub fn record_dispatch(&mut self, outcome: &shared::DispatchOutcome) {
        match outcome.reason {
            Some(shared::DispatchSkip::Dedup) => self.deduped += 1,
            Some(shared::DispatchSkip::NoSubscriptions) => {}
            None if outcome.ok => self.notified += 1,
            None => {}
        }
        self.pruned += outcome.pruned;
    }
}

/// Run `work` over `items` with bounded width until the budget runs out
pub async fn run_batch<T, F, Fut>(
    job: &str,
    items: Vec<T>,
    limits: BatchLimits,
    work: F,
) -> BatchReport
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = UnitReport>,
{
    let started = Instant::now();
    let deadline = started + limits.budget;
    let total = items.len();

    let units: Vec<Option<UnitReport>> = stream::iter(items)
        .map(|item| {
            let unit = if Instant::now() >= deadline {
                None
            } else {
                Some(work(item))
            };
            async move {
                match unit {
                    Some(fut) => Some(fut.await),
                    None => None,
                }
            }
        })
        .buffer_unordered(limits.concurrency.max(1))
        .collect()
        .await;

    let mut report = BatchReport::new(job);
    for unit in units {
        match unit {
            Some(unit) => report.absorb(unit),
            None => {
                report.skipped += 1;
                report.deadline_hit = true;
            }
        }
    }

    let report = report.finish(started);
    tracing::info!(
        job,
        total,
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        deadline_hit = report.deadline_hit,
        elapsed_ms = report.elapsed_ms,
        "Batch finished"
    );
    report
}
