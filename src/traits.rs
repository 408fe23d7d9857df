use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::classify::DeliveryError;
use crate::types::{Notification, NotificationDraft, Subscription, SubscriptionCount, Task};

/// Failures surfaced to callers of the service layer. The HTTP layer (outside
/// this crate) maps `NotFound` to a 404-equivalent and `InvalidSubscription`
/// to a validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
    #[error("notification not found: {0}")]
    NotFound(String),
}

/// Durable collection of push endpoints and their capability keys.
///
/// Mutations persist synchronously; a persistence failure is logged and the
/// in-memory result still stands (best-effort durability).
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert, or replace the record with the same endpoint (refreshing its
    /// timestamp). Rejects records without an endpoint before any mutation.
    async fn upsert(&self, subscription: Subscription) -> Result<(), ServiceError>;

    /// Every stored subscription, unfiltered.
    async fn list(&self) -> Vec<Subscription>;

    /// Only subscriptions passing the format/key invariant. Invalid-format
    /// records must never be used for delivery.
    async fn list_valid(&self) -> Vec<Subscription>;

    /// Remove every subscription whose endpoint is in `endpoints`; persists
    /// once. Returns the number removed.
    async fn remove_by_endpoints(&self, endpoints: &[String]) -> usize;

    /// Stamp a successful validation probe.
    async fn mark_validated(&self, endpoint: &str, at: DateTime<Utc>);

    /// Remove everything; returns the prior count.
    async fn clear(&self) -> usize;

    async fn count(&self) -> SubscriptionCount;
}

/// Durable collection of scheduled notification jobs.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Assign a fresh id, stamp `createdAt`, append, persist, and return the
    /// created record.
    async fn create(&self, draft: NotificationDraft) -> Notification;

    async fn list(&self) -> Vec<Notification>;

    /// Remove by id. The caller is responsible for cancelling the
    /// corresponding timer in the same operation.
    async fn delete_by_id(&self, id: &str) -> Result<(), ServiceError>;
}

/// Read-only view of the tracker's task domain.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Incomplete tasks with a reminder time newer than `not_older_than`
    /// (unbounded into the future), ordered by reminder time.
    async fn query_remindable(&self, not_older_than: DateTime<Utc>) -> anyhow::Result<Vec<Task>>;

    async fn get_task(&self, id: i64) -> anyhow::Result<Option<Task>>;
}

/// Opaque push transport, configured with a VAPID key pair. Payload
/// encryption and transport framing live behind this seam; the engine only
/// sees success or a classified failure.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, subscription: &Subscription, payload: &[u8]) -> Result<(), DeliveryError>;
}
