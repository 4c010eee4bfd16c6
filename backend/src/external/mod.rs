//! External API integrations
//!
//! The batch jobs only see the two traits below, so tests and replays can
//! swap in their own metric source and push transport.

pub mod push;
pub mod weather;

use async_trait::async_trait;
use shared::{GeoPoint, MetricSample, PushPayload, PushSubscription, TimeWindow};
use thiserror::Error;

use crate::error::{AppError, AppResult};

pub use push::WebPushClient;
pub use weather::WeatherClient;

/// Supplies weather samples for a location
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Samples with `start <= timestamp <= end`, ascending by time
    async fn fetch_samples(
        &self,
        location: GeoPoint,
        window: TimeWindow,
    ) -> AppResult<Vec<MetricSample>>;
}

/// A failed push attempt
#[derive(Debug, Clone, Error)]
#[error("push failed (status {status_code:?}): {message}")]
pub struct PushFailure {
    /// Push service status; `None` when the request never got an answer
    pub status_code: Option<u16>,
    pub message: String,
}

impl PushFailure {
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    /// 404 and 410 mean the endpoint is gone for good
    pub fn is_permanent(&self) -> bool {
        matches!(self.status_code, Some(404) | Some(410))
    }

    /// Classify the failure for the subscription it happened on
    pub fn into_error(self, endpoint: &str) -> AppError {
        match self.status_code {
            Some(status) if self.is_permanent() => AppError::InvalidSubscription {
                endpoint: endpoint.to_string(),
                status,
            },
            _ => AppError::UpstreamFailure(self.to_string()),
        }
    }
}

/// Delivers a payload to one push subscription
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushFailure>;
}
