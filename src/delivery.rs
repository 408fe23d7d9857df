use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::classify::classify;
use crate::traits::{PushProvider, SubscriptionStore};
use crate::types::{DeliveryFailure, DeliverySummary, Notification, Subscription};

/// Fans a notification out to every valid subscription and prunes the
/// endpoints the provider reports as permanently gone.
pub struct DeliveryEngine {
    subscriptions: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn PushProvider>,
    icon: String,
}

impl DeliveryEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn PushProvider>,
        icon: String,
    ) -> Self {
        Self {
            subscriptions,
            provider,
            icon,
        }
    }

    fn build_payload(&self, notification: &Notification) -> anyhow::Result<Vec<u8>> {
        let mut data = serde_json::Map::new();
        data.insert("notificationId".to_string(), json!(notification.id));
        for (key, value) in &notification.data {
            data.insert(key.clone(), value.clone());
        }
        let payload = json!({
            "title": notification.title,
            "body": notification.body,
            "icon": self.icon,
            "timestamp": Utc::now().timestamp_millis(),
            "data": data,
        });
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Deliver `notification` to all currently valid subscriptions.
    ///
    /// Dispatches run concurrently and settle independently: one endpoint's
    /// failure never blocks or fails another's delivery. Endpoints whose
    /// failure classifies as `invalid_subscription` are removed from the
    /// store in one batched prune after the fan-out joins; every other
    /// failure is retained in the summary and the subscription kept.
    pub async fn send_to_all(&self, notification: &Notification) -> anyhow::Result<DeliverySummary> {
        // Invalid-format records may have been loaded from disk or upserted
        // by an old client; drop them before spending provider calls.
        let all = self.subscriptions.list().await;
        let (valid, invalid): (Vec<Subscription>, Vec<Subscription>) =
            all.into_iter().partition(Subscription::is_valid_format);
        if !invalid.is_empty() {
            let endpoints: Vec<String> = invalid.into_iter().map(|s| s.endpoint).collect();
            let removed = self.subscriptions.remove_by_endpoints(&endpoints).await;
            warn!(removed, "Pruned invalid-format subscriptions before delivery");
        }

        if valid.is_empty() {
            info!(title = %notification.title, "No valid subscriptions, skipping delivery");
            return Ok(DeliverySummary::default());
        }

        let payload = self.build_payload(notification)?;
        info!(
            title = %notification.title,
            targets = valid.len(),
            "Sending notification"
        );

        let payload_ref = payload.as_slice();
        let results = futures::future::join_all(valid.iter().map(|subscription| async move {
            (
                subscription,
                self.provider.send(subscription, payload_ref).await,
            )
        }))
        .await;

        let mut summary = DeliverySummary {
            total_attempted: valid.len(),
            ..Default::default()
        };
        let mut expired: Vec<String> = Vec::new();
        for (subscription, result) in results {
            match result {
                Ok(()) => summary.success_count += 1,
                Err(error) => {
                    let verdict = classify(&error);
                    if verdict.is_invalid_subscription {
                        expired.push(subscription.endpoint.clone());
                    } else {
                        warn!(
                            endpoint = %subscription.endpoint,
                            category = verdict.category.as_str(),
                            "Delivery failed: {}",
                            error
                        );
                        summary.errors.push(DeliveryFailure {
                            endpoint: subscription.endpoint.clone(),
                            status_code: verdict.status_code,
                            category: verdict.category,
                            message: error.to_string(),
                        });
                    }
                }
            }
        }

        if !expired.is_empty() {
            summary.invalid_count = self.subscriptions.remove_by_endpoints(&expired).await;
            info!(
                removed = summary.invalid_count,
                "Pruned expired subscriptions after delivery"
            );
        }

        Ok(summary)
    }
}
