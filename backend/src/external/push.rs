//! Web Push delivery through a relay
//!
//! The relay owns VAPID signing and payload encryption. It answers 2xx when
//! the push service accepted the message and otherwise passes the push
//! service's status code back as `statusCode` in a JSON body. Only that
//! status says anything about the subscription; a bare relay error does not.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{PushPayload, PushSubscription};
use std::time::Duration;

use super::{PushFailure, PushSender};
use crate::error::{AppError, AppResult};

/// Push relay client
#[derive(Clone)]
pub struct WebPushClient {
    client: Client,
    relay_url: String,
    api_key: String,
    ttl_secs: u32,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    subscription: RelaySubscription<'a>,
    /// Serialized `PushPayload`, delivered verbatim to the service worker
    payload: String,
    ttl: u32,
}

#[derive(Debug, Serialize)]
struct RelaySubscription<'a> {
    endpoint: &'a str,
    keys: RelayKeys<'a>,
}

#[derive(Debug, Serialize)]
struct RelayKeys<'a> {
    p256dh: &'a str,
    auth: &'a str,
}

/// Relay error body
#[derive(Debug, Deserialize)]
struct RelayError {
    #[serde(rename = "statusCode")]
    status_code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

impl WebPushClient {
    /// Create a new relay client
    pub fn new(
        relay_url: String,
        api_key: String,
        ttl_secs: u32,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Push HTTP client: {}", e)))?;

        Ok(Self {
            client,
            relay_url,
            api_key,
            ttl_secs,
        })
    }
}

#[async_trait]
impl PushSender for WebPushClient {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushFailure> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| PushFailure::transport(format!("Failed to encode payload: {}", e)))?;

        let request = RelayRequest {
            subscription: RelaySubscription {
                endpoint: &subscription.endpoint,
                keys: RelayKeys {
                    p256dh: &subscription.p256dh,
                    auth: &subscription.auth,
                },
            },
            payload,
            ttl: self.ttl_secs,
        };

        let response = self
            .client
            .post(&self.relay_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| PushFailure::transport(format!("Push relay request failed: {}", e)))?;

        if response.status().is_success() {
            return Ok(());
        }

        let http_status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(relay_failure(http_status, &body))
    }
}

/// Map a non-2xx relay answer to a push failure.
///
/// The failure carries a push service status only when the relay reported
/// one; anything else (wrong route, proxy error, relay crash) is a transport
/// failure and never marks the subscription dead.
fn relay_failure(http_status: u16, body: &str) -> PushFailure {
    let error = serde_json::from_str::<RelayError>(body).ok();
    let message = error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| "Unknown error".to_string());

    match error.and_then(|e| e.status_code) {
        Some(status_code) => PushFailure::status(status_code, message),
        None => PushFailure::transport(format!("relay answered {}: {}", http_status, message)),
    }
}
