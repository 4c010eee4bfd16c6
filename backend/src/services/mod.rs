//! Business logic services
//!
//! The services never reach for globals: [`Engine`] carries the stores, the
//! metric source, the push transport and the clock, and hands them to each
//! service per request.

pub mod batch;
pub mod dispatcher;
pub mod hazards;
pub mod history;
pub mod insights;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::external::{MetricSource, PushSender};
use crate::repository::{MonitorStore, NotificationStore};

pub use batch::{run_batch, BatchLimits, BatchReport, UnitReport};
pub use dispatcher::NotificationDispatcher;
pub use hazards::HazardService;
pub use history::HistoryService;
pub use insights::InsightService;
pub use rules::{RuleEvaluator, RuleService, WeatherEvaluator};

/// Injected collaborators shared by every service
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn MonitorStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub metrics: Arc<dyn MetricSource>,
    pub push: Arc<dyn PushSender>,
    pub clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn dispatcher(&self, config: &MonitorConfig) -> NotificationDispatcher {
        NotificationDispatcher::new(
            self.notifications.clone(),
            self.push.clone(),
            Duration::from_secs(config.unit_timeout_secs),
        )
    }

    pub fn rule_service(&self, config: &MonitorConfig) -> RuleService {
        let evaluator = RuleEvaluator::new(WeatherEvaluator::new(
            self.metrics.clone(),
            Duration::from_secs(config.unit_timeout_secs),
        ));
        RuleService::new(
            self.store.clone(),
            evaluator,
            self.dispatcher(config),
            self.clock.clone(),
            config.into(),
        )
    }

    pub fn hazard_service(&self, config: &MonitorConfig) -> HazardService {
        HazardService::new(
            self.store.clone(),
            self.dispatcher(config),
            self.clock.clone(),
            config.into(),
        )
    }

    pub fn insight_service(&self, config: &MonitorConfig) -> InsightService {
        InsightService::new(
            self.store.clone(),
            self.dispatcher(config),
            self.clock.clone(),
            config.subscription_batch_limit,
        )
    }

    pub fn history_service(&self, config: &MonitorConfig) -> HistoryService {
        HistoryService::new(
            self.store.clone(),
            self.metrics.clone(),
            self.clock.clone(),
            config.profile_batch_limit,
        )
    }
}
