//! Deduplicated push fan-out
//!
//! A dispatch with a dedup claim is admitted by one insert into the ledger;
//! the unique constraint decides races between overlapping runs. Admitted
//! payloads go to every subscription of the user at once. Endpoints the push
//! service reports as gone (404/410) are deleted, anything else is logged
//! and left for the next notification.

use futures::future::join_all;
use shared::{
    validate_dedup_key, DedupClaim, DispatchOutcome, DispatchSkip, PushPayload, PushSubscription,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::external::{PushFailure, PushSender};
use crate::repository::{LedgerAdmission, NotificationStore};

/// Result of a single subscription attempt
enum Delivery {
    Sent,
    Pruned,
    Failed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    sender: Arc<dyn PushSender>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        sender: Arc<dyn PushSender>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            send_timeout,
        }
    }

    /// Admit and deliver one notification to a user
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        payload: &PushPayload,
        claim: Option<&DedupClaim>,
    ) -> AppResult<DispatchOutcome> {
        if let Some(claim) = claim {
            validate_dedup_key(&claim.key).map_err(|msg| AppError::validation("dedup_key", msg))?;

            match self.admit(user_id, claim).await {
                Ok(()) => {}
                Err(e @ AppError::DuplicateSuppressed(_)) => {
                    tracing::debug!(%user_id, "{}", e);
                    return Ok(DispatchOutcome::skipped(DispatchSkip::Dedup));
                }
                Err(e) => return Err(e),
            }
        }

        let subscriptions = self.store.list_push_subscriptions(user_id).await?;
        if subscriptions.is_empty() {
            tracing::debug!(%user_id, "No push subscriptions");
            return Ok(DispatchOutcome::skipped(DispatchSkip::NoSubscriptions));
        }

        let deliveries = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.deliver(subscription, payload)),
        )
        .await;

        let mut outcome = DispatchOutcome::default();
        for delivery in deliveries {
            match delivery {
                Delivery::Sent => outcome.sent += 1,
                Delivery::Pruned => outcome.pruned += 1,
                Delivery::Failed => outcome.failed += 1,
            }
        }
        outcome.ok = outcome.sent > 0;

        tracing::debug!(
            %user_id,
            sent = outcome.sent,
            pruned = outcome.pruned,
            failed = outcome.failed,
            "Dispatch finished"
        );
        Ok(outcome)
    }

    /// Insert the claim into the ledger; a held key is `DuplicateSuppressed`
    async fn admit(&self, user_id: Uuid, claim: &DedupClaim) -> AppResult<()> {
        match self.store.claim_dedup(user_id, claim).await {
            Ok(LedgerAdmission::Admitted) => Ok(()),
            Ok(LedgerAdmission::Duplicate) => {
                Err(AppError::DuplicateSuppressed(claim.key.clone()))
            }
            Err(e @ AppError::PersistenceFailure(_)) => Err(e),
            Err(e) => Err(AppError::PersistenceFailure(e.to_string())),
        }
    }

    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> Delivery {
        let attempt = tokio::time::timeout(self.send_timeout, self.sender.send(subscription, payload))
            .await
            .unwrap_or_else(|_| Err(PushFailure::transport("send timed out")));

        let failure = match attempt {
            Ok(()) => return Delivery::Sent,
            Err(failure) => failure.into_error(&subscription.endpoint),
        };

        match &failure {
            AppError::InvalidSubscription { .. } => {
                match self.store.delete_push_subscription(&subscription.endpoint).await {
                    Ok(_) => {
                        tracing::info!(
                            user_id = %subscription.user_id,
                            "Pruned dead push subscription: {}",
                            failure
                        );
                        Delivery::Pruned
                    }
                    Err(e) => {
                        tracing::warn!(
                            endpoint = %subscription.endpoint,
                            "Failed to prune dead push subscription: {}",
                            e
                        );
                        Delivery::Failed
                    }
                }
            }
            _ => {
                tracing::warn!(
                    endpoint = %subscription.endpoint,
                    user_id = %subscription.user_id,
                    "Push delivery failed: {}",
                    failure
                );
                Delivery::Failed
            }
        }
    }
}
