//! Push subscriptions, payloads and dispatch outcomes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A browser push endpoint registered by a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub user_id: Uuid,
}

/// What the service worker receives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl PushPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            url: None,
            tag: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Ledger admission for a notification.
///
/// The key is admitted at most once per user; the `kind` is informational.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DedupClaim {
    pub key: String,
    pub kind: String,
}

impl DedupClaim {
    pub fn new(key: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
        }
    }
}

/// Why a dispatch stopped before sending anything
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DispatchSkip {
    #[serde(rename = "dedup")]
    Dedup,
    #[serde(rename = "no-subs")]
    NoSubscriptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub ok: bool,
    pub sent: u32,
    /// Subscriptions removed after a 404/410
    pub pruned: u32,
    /// Transient failures, not retried in this run
    pub failed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DispatchSkip>,
}

impl DispatchOutcome {
    pub fn skipped(reason: DispatchSkip) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            ..Default::default()
        }
    }
}
