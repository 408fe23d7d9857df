//! Shared test doubles: in-memory stores and a scripted push provider.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::classify::DeliveryError;
use crate::traits::{
    NotificationStore, PushProvider, ServiceError, SubscriptionStore, TaskRepository,
};
use crate::types::{
    Notification, NotificationDraft, Subscription, SubscriptionCount, Task,
};

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: RwLock<Vec<Subscription>>,
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
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
                subscription.last_validated =
                    subscription.last_validated.or(existing.last_validated);
                *existing = subscription;
            }
            None => subscriptions.push(subscription),
        }
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
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| !endpoints.contains(&s.endpoint));
        before - subscriptions.len()
    }

    async fn mark_validated(&self, endpoint: &str, at: DateTime<Utc>) {
        let mut subscriptions = self.subscriptions.write().await;
        if let Some(subscription) = subscriptions.iter_mut().find(|s| s.endpoint == endpoint) {
            subscription.last_validated = Some(at);
        }
    }

    async fn clear(&self) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let count = subscriptions.len();
        subscriptions.clear();
        count
    }

    async fn count(&self) -> SubscriptionCount {
        SubscriptionCount {
            count: self.subscriptions.read().await.len(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: RwLock<Vec<Notification>>,
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
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
        self.notifications.write().await.push(notification.clone());
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
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTaskRepo {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskRepo {
    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.push(task);
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepo {
    async fn query_remindable(&self, not_older_than: DateTime<Utc>) -> anyhow::Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .iter()
            .filter(|t| {
                !t.is_complete
                    && t.reminder_time
                        .map(|at| at > not_older_than)
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.reminder_time);
        Ok(tasks)
    }

    async fn get_task(&self, id: i64) -> anyhow::Result<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }
}

enum ScriptedFailure {
    Status(u16),
    Timeout,
    Transport,
}

/// Push provider double: records every dispatch and fails scripted
/// endpoints with the configured error.
#[derive(Default)]
pub struct MockPushProvider {
    failures: RwLock<HashMap<String, ScriptedFailure>>,
    sent: RwLock<Vec<(String, Vec<u8>)>>,
}

impl MockPushProvider {
    pub async fn fail_with_status(&self, endpoint: &str, status: u16) {
        self.failures
            .write()
            .await
            .insert(endpoint.to_string(), ScriptedFailure::Status(status));
    }

    pub async fn fail_with_timeout(&self, endpoint: &str) {
        self.failures
            .write()
            .await
            .insert(endpoint.to_string(), ScriptedFailure::Timeout);
    }

    pub async fn fail_with_transport(&self, endpoint: &str) {
        self.failures
            .write()
            .await
            .insert(endpoint.to_string(), ScriptedFailure::Transport);
    }

    pub async fn sent_endpoints(&self) -> Vec<String> {
        self.sent.read().await.iter().map(|(e, _)| e.clone()).collect()
    }

    pub async fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.sent.read().await.iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(&self, subscription: &Subscription, payload: &[u8]) -> Result<(), DeliveryError> {
        if let Some(failure) = self.failures.read().await.get(&subscription.endpoint) {
            return Err(match failure {
                ScriptedFailure::Status(status) => {
                    DeliveryError::from_status(*status, "scripted failure")
                }
                ScriptedFailure::Timeout => DeliveryError::timeout("scripted timeout"),
                ScriptedFailure::Transport => {
                    DeliveryError::transport("scripted connection reset")
                }
            });
        }
        self.sent
            .write()
            .await
            .push((subscription.endpoint.clone(), payload.to_vec()));
        Ok(())
    }
}

pub fn notification_at(title: &str, body: &str, at: DateTime<Utc>) -> Notification {
    Notification {
        id: uuid::Uuid::new_v4().to_string(),
        title: title.to_string(),
        body: body.to_string(),
        scheduled_time: at,
        repeat: "none".to_string(),
        created_at: Utc::now(),
        data: HashMap::new(),
    }
}

pub fn notification_due_now(title: &str, body: &str) -> Notification {
    notification_at(title, body, Utc::now())
}

pub fn task_with_reminder(id: i64, title: &str, reminder_time: Option<DateTime<Utc>>) -> Task {
    Task {
        id,
        title: title.to_string(),
        due_date: None,
        reminder_time,
        reminder_type: Some("custom".to_string()),
        is_complete: false,
    }
}
