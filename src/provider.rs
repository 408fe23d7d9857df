use std::time::Duration;

use async_trait::async_trait;

use crate::classify::DeliveryError;
use crate::config::ProviderConfig;
use crate::traits::PushProvider;
use crate::types::Subscription;

/// HTTP adapter for the push service fronting each subscription endpoint.
///
/// Posts the payload to the endpoint with a TTL header and the server's
/// VAPID identification. Payload encryption and the rest of the transport
/// framing are the push gateway's concern, not this engine's.
pub struct HttpPushProvider {
    client: reqwest::Client,
    ttl_secs: u64,
    vapid_public_key: String,
}

impl HttpPushProvider {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            ttl_secs: config.ttl_secs,
            vapid_public_key: config.vapid_public_key.clone(),
        })
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn send(&self, subscription: &Subscription, payload: &[u8]) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(payload.to_vec());
        if !self.vapid_public_key.is_empty() {
            request = request.header(
                "Crypto-Key",
                format!("p256ecdsa={}", self.vapid_public_key),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::network(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::from_status(status.as_u16(), &body))
    }
}
