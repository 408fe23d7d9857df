//! File-backed stores. Each collection lives in one JSON file that is
//! rewritten wholesale on every mutation, via a temp file renamed into place
//! so a crash mid-write never leaves a half-written store behind.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::traits::{NotificationStore, ServiceError, SubscriptionStore};
use crate::types::{Notification, NotificationDraft, Subscription, SubscriptionCount};

/// Load a JSON array of records, resetting to empty on a missing or corrupt
/// file. Corruption is the only externally fatal condition here and it is
/// recovered, not propagated.
async fn load_or_reset<T: DeserializeOwned>(path: &Path, what: &str) -> Vec<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<Vec<T>>(&bytes) {
            Ok(records) => {
                info!(count = records.len(), file = %path.display(), "Loaded {}", what);
                records
            }
            Err(e) => {
                error!(file = %path.display(), "Corrupt {} store, resetting to empty: {}", what, e);
                Vec::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            error!(file = %path.display(), "Failed to read {} store, starting empty: {}", what, e);
            Vec::new()
        }
    }
}

async fn write_records<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Subscriptions collection backed by `subscriptions.json`.
pub struct JsonSubscriptionStore {
    path: PathBuf,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl JsonSubscriptionStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let subscriptions = load_or_reset(&path, "subscriptions").await;
        Self {
            path,
            subscriptions: RwLock::new(subscriptions),
        }
    }

    /// Persistence is best-effort: a write failure is logged and the
    /// in-memory mutation stands.
    async fn persist(&self, subscriptions: &[Subscription]) {
        if let Err(e) = write_records(&self.path, subscriptions).await {
            error!(file = %self.path.display(), "Failed to persist subscriptions: {}", e);
        }
    }
}

#[async_trait]
impl SubscriptionStore for JsonSubscriptionStore {
    async fn upsert(&self, mut subscription: Subscription) -> Result<(), ServiceError> {
        if subscription.endpoint.trim().is_empty() {
            return Err(ServiceError::InvalidSubscription(
                "subscription has no endpoint".to_string(),
            ));
        }
        subscription.timestamp = Utc::now();

        let mut subscriptions = self.subscriptions.write().await;
        match subscriptions
            .iter_mut()
            .find(|s| s.endpoint == subscription.endpoint)
        {
            Some(existing) => {
                // Re-registration of a known endpoint keeps its probe stamp.
                subscription.last_validated =
                    subscription.last_validated.or(existing.last_validated);
                *existing = subscription;
                info!("Updated existing subscription");
            }
            None => {
                subscriptions.push(subscription);
                info!(total = subscriptions.len(), "Added new subscription");
            }
        }
        self.persist(&subscriptions).await;
        Ok(())
    }

    async fn list(&self) -> Vec<Subscription> {
        self.subscriptions.read().await.clone()
    }

    async fn list_valid(&self) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.is_valid_format())
            .cloned()
            .collect()
    }

    async fn remove_by_endpoints(&self, endpoints: &[String]) -> usize {
        if endpoints.is_empty() {
            return 0;
        }
        let doomed: HashSet<&str> = endpoints.iter().map(String::as_str).collect();
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| !doomed.contains(s.endpoint.as_str()));
        let removed = before - subscriptions.len();
        if removed > 0 {
            self.persist(&subscriptions).await;
            info!(removed, "Removed subscriptions");
        }
        removed
    }

    async fn mark_validated(&self, endpoint: &str, at: DateTime<Utc>) {
        let mut subscriptions = self.subscriptions.write().await;
        let mut stamped = false;
        if let Some(subscription) = subscriptions.iter_mut().find(|s| s.endpoint == endpoint) {
            subscription.last_validated = Some(at);
            stamped = true;
        }
        if stamped {
            self.persist(&subscriptions).await;
        } else {
            warn!(endpoint, "Cannot stamp validation on unknown endpoint");
        }
    }

    async fn clear(&self) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let count = subscriptions.len();
        subscriptions.clear();
        self.persist(&subscriptions).await;
        count
    }

    async fn count(&self) -> SubscriptionCount {
        SubscriptionCount {
            count: self.subscriptions.read().await.len(),
            timestamp: Utc::now(),
        }
    }
}

/// Notifications collection backed by `notifications.json`.
pub struct JsonNotificationStore {
    path: PathBuf,
    notifications: RwLock<Vec<Notification>>,
}

impl JsonNotificationStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let notifications = load_or_reset(&path, "notifications").await;
        Self {
            path,
            notifications: RwLock::new(notifications),
        }
    }

    async fn persist(&self, notifications: &[Notification]) {
        if let Err(e) = write_records(&self.path, notifications).await {
            error!(file = %self.path.display(), "Failed to persist notifications: {}", e);
        }
    }
}

#[async_trait]
impl NotificationStore for JsonNotificationStore {
    async fn create(&self, draft: NotificationDraft) -> Notification {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            title: draft.title,
            body: draft.body,
            scheduled_time: draft.scheduled_time,
            repeat: draft.repeat,
            created_at: Utc::now(),
            data: draft.data,
        };
        let mut notifications = self.notifications.write().await;
        notifications.push(notification.clone());
        self.persist(&notifications).await;
        info!(
            id = %notification.id,
            title = %notification.title,
            at = %notification.scheduled_time.to_rfc3339(),
            "Created notification"
        );
        notification
    }

    async fn list(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), ServiceError> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|n| n.id != id);
        if notifications.len() == before {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        self.persist(&notifications).await;
        info!(id, "Deleted notification");
        Ok(())
    }
}
