use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::delivery::DeliveryEngine;
use crate::scheduler::Scheduler;
use crate::traits::{
    NotificationStore, PushProvider, ServiceError, SubscriptionStore, TaskRepository,
};
use crate::types::{
    DeliverySummary, Notification, NotificationDraft, Subscription, SubscriptionCount,
    ValidationSummary,
};
use crate::validator::SubscriptionValidator;

/// The operations consumed by the HTTP layer, which lives outside this
/// crate. Each is a thin wrapper over the stores and engines; failures that
/// the caller must distinguish come back as `ServiceError`.
pub struct NotificationService {
    subscriptions: Arc<dyn SubscriptionStore>,
    notifications: Arc<dyn NotificationStore>,
    tasks: Arc<dyn TaskRepository>,
    scheduler: Arc<Scheduler>,
    delivery: Arc<DeliveryEngine>,
    validator: SubscriptionValidator,
}

impl NotificationService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        notifications: Arc<dyn NotificationStore>,
        tasks: Arc<dyn TaskRepository>,
        scheduler: Arc<Scheduler>,
        delivery: Arc<DeliveryEngine>,
        provider: Arc<dyn PushProvider>,
    ) -> Self {
        let validator = SubscriptionValidator::new(Arc::clone(&subscriptions), provider);
        Self {
            subscriptions,
            notifications,
            tasks,
            scheduler,
            delivery,
            validator,
        }
    }

    pub async fn save_subscription(&self, subscription: Subscription) -> Result<(), ServiceError> {
        self.subscriptions.upsert(subscription).await
    }

    /// Create and arm a notification. A scheduled time in the past delivers
    /// immediately instead of arming a timer.
    pub async fn schedule_notification(&self, draft: NotificationDraft) -> Notification {
        let notification = self.notifications.create(draft).await;
        self.scheduler.schedule(notification.clone()).await;
        notification
    }

    pub async fn list_notifications(&self) -> Vec<Notification> {
        self.notifications.list().await
    }

    /// Remove a notification and cancel its timer in the same operation.
    pub async fn delete_notification(&self, id: &str) -> Result<(), ServiceError> {
        self.notifications.delete_by_id(id).await?;
        self.scheduler.cancel(id).await;
        Ok(())
    }

    /// Send an unscheduled test notification to every valid subscription.
    /// The test record is ephemeral: it never enters the store.
    pub async fn send_test_notification(&self) -> anyhow::Result<DeliverySummary> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            title: "Test notification".to_string(),
            body: "This is a test notification from the server.".to_string(),
            scheduled_time: Utc::now(),
            repeat: "none".to_string(),
            created_at: Utc::now(),
            data: [("type".to_string(), json!("test"))].into_iter().collect(),
        };
        let summary = self.delivery.send_to_all(&notification).await?;
        info!(
            attempted = summary.total_attempted,
            success = summary.success_count,
            pruned = summary.invalid_count,
            "Test notification sent"
        );
        Ok(summary)
    }

    pub async fn validate_subscriptions(&self) -> anyhow::Result<ValidationSummary> {
        self.validator.validate_all().await
    }

    /// Drop every stored subscription that fails the format invariant.
    /// Returns the number removed.
    pub async fn clean_invalid_subscriptions(&self) -> usize {
        let invalid: Vec<String> = self
            .subscriptions
            .list()
            .await
            .into_iter()
            .filter(|s| !s.is_valid_format())
            .map(|s| s.endpoint)
            .collect();
        if invalid.is_empty() {
            return 0;
        }
        self.subscriptions.remove_by_endpoints(&invalid).await
    }

    pub async fn clear_subscriptions(&self) -> usize {
        self.subscriptions.clear().await
    }

    pub async fn subscription_count(&self) -> SubscriptionCount {
        self.subscriptions.count().await
    }

    /// Snapshot of the whole engine for the debug endpoint.
    pub async fn debug_snapshot(&self) -> anyhow::Result<DebugSnapshot> {
        let now = Utc::now();
        let subscriptions = self.subscriptions.list().await;
        let notifications = self.notifications.list().await;
        let reminders = self
            .tasks
            .query_remindable(now - chrono::Duration::hours(24))
            .await?;

        Ok(DebugSnapshot {
            timestamp: now,
            subscriptions: SubscriptionsDebug {
                count: subscriptions.len(),
                endpoints: subscriptions
                    .iter()
                    .map(|s| SubscriptionDebugEntry {
                        endpoint: truncate_endpoint(&s.endpoint),
                        timestamp: s.timestamp,
                        last_validated: s.last_validated,
                    })
                    .collect(),
            },
            scheduled_notifications: NotificationsDebug {
                count: notifications.len(),
                armed_timers: self.scheduler.armed_count().await,
                notifications: notifications
                    .iter()
                    .map(|n| NotificationDebugEntry {
                        id: n.id.clone(),
                        title: n.title.clone(),
                        scheduled_time: n.scheduled_time,
                        created_at: n.created_at,
                        is_past: n.scheduled_time <= now,
                    })
                    .collect(),
            },
            task_reminders: TaskRemindersDebug {
                count: reminders.len(),
                tasks: reminders
                    .iter()
                    .map(|t| TaskDebugEntry {
                        id: t.id,
                        title: t.title.clone(),
                        reminder_time: t.reminder_time,
                        is_past_due: t.reminder_time.map(|at| at <= now).unwrap_or(false),
                    })
                    .collect(),
            },
        })
    }
}

fn truncate_endpoint(endpoint: &str) -> String {
    if endpoint.chars().count() > 50 {
        let prefix: String = endpoint.chars().take(50).collect();
        format!("{}...", prefix)
    } else {
        endpoint.to_string()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub timestamp: DateTime<Utc>,
    pub subscriptions: SubscriptionsDebug,
    pub scheduled_notifications: NotificationsDebug,
    pub task_reminders: TaskRemindersDebug,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionsDebug {
    pub count: usize,
    pub endpoints: Vec<SubscriptionDebugEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDebugEntry {
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsDebug {
    pub count: usize,
    pub armed_timers: usize,
    pub notifications: Vec<NotificationDebugEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDebugEntry {
    pub id: String,
    pub title: String,
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_past: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRemindersDebug {
    pub count: usize,
    pub tasks: Vec<TaskDebugEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDebugEntry {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<DateTime<Utc>>,
    pub is_past_due: bool,
}
