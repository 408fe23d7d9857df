use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::classify::classify;
use crate::traits::{PushProvider, SubscriptionStore};
use crate::types::{Subscription, ValidationSummary};

/// Periodic sweep that probes every subscription with a silent payload and
/// prunes the ones the provider no longer accepts. Runs shortly after
/// startup and then on a recurring schedule.
pub struct SubscriptionValidator {
    subscriptions: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn PushProvider>,
}

impl SubscriptionValidator {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, provider: Arc<dyn PushProvider>) -> Self {
        Self {
            subscriptions,
            provider,
        }
    }

    /// The probe is invisible to the user: the service worker drops payloads
    /// marked silent instead of showing them.
    fn probe_payload() -> anyhow::Result<Vec<u8>> {
        let payload = json!({
            "type": "subscription-validation",
            "silent": true,
            "timestamp": Utc::now().timestamp_millis(),
        });
        Ok(serde_json::to_vec(&payload)?)
    }

    pub async fn validate_all(&self) -> anyhow::Result<ValidationSummary> {
        let all = self.subscriptions.list().await;
        if all.is_empty() {
            info!("No subscriptions to validate");
            return Ok(ValidationSummary::default());
        }

        let mut summary = ValidationSummary::default();

        // Obviously malformed records don't rate a provider call.
        let (candidates, malformed): (Vec<Subscription>, Vec<Subscription>) =
            all.into_iter().partition(Subscription::is_valid_format);
        if !malformed.is_empty() {
            let endpoints: Vec<String> = malformed.into_iter().map(|s| s.endpoint).collect();
            summary.invalid_count += self.subscriptions.remove_by_endpoints(&endpoints).await;
            warn!(
                removed = summary.invalid_count,
                "Pruned malformed subscriptions before probing"
            );
        }

        if candidates.is_empty() {
            return Ok(summary);
        }

        let payload = Self::probe_payload()?;
        info!(count = candidates.len(), "Probing subscriptions");

        let payload_ref = payload.as_slice();
        let results = futures::future::join_all(candidates.iter().map(|subscription| async move {
            (
                subscription,
                self.provider.send(subscription, payload_ref).await,
            )
        }))
        .await;

        let mut expired: Vec<String> = Vec::new();
        for (subscription, result) in results {
            match result {
                Ok(()) => {
                    self.subscriptions
                        .mark_validated(&subscription.endpoint, Utc::now())
                        .await;
                    summary.valid_count += 1;
                }
                Err(error) => {
                    let verdict = classify(&error);
                    if verdict.is_invalid_subscription {
                        expired.push(subscription.endpoint.clone());
                    } else {
                        warn!(
                            endpoint = %subscription.endpoint,
                            category = verdict.category.as_str(),
                            "Probe failed, keeping subscription: {}",
                            error
                        );
                        summary.error_count += 1;
                    }
                }
            }
        }

        if !expired.is_empty() {
            summary.invalid_count += self.subscriptions.remove_by_endpoints(&expired).await;
        }

        info!(
            valid = summary.valid_count,
            invalid = summary.invalid_count,
            errors = summary.error_count,
            "Validation sweep finished"
        );
        Ok(summary)
    }
}
