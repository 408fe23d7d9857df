use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::scheduler::Scheduler;
use crate::traits::{NotificationStore, TaskRepository};
use crate::types::{Notification, NotificationDraft, Task};

const TASK_REMINDER: &str = "task_reminder";
const OVERDUE_REMINDER: &str = "overdue_reminder";

/// Derives reminder notifications from task records: future reminder times
/// get a scheduled notification, past ones an immediate overdue nudge.
pub struct ReminderDeriver {
    tasks: Arc<dyn TaskRepository>,
    notifications: Arc<dyn NotificationStore>,
    scheduler: Arc<Scheduler>,
    lookback: chrono::Duration,
}

impl ReminderDeriver {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        notifications: Arc<dyn NotificationStore>,
        scheduler: Arc<Scheduler>,
        lookback_hours: i64,
    ) -> Self {
        Self {
            tasks,
            notifications,
            scheduler,
            lookback: chrono::Duration::hours(lookback_hours),
        }
    }

    /// Schedule a reminder for a task with a future reminder time.
    ///
    /// Idempotent while a reminder for the task is live: a second call finds
    /// the existing notification and skips. Deleting that notification makes
    /// the task remindable again.
    pub async fn schedule_task_reminder(&self, task: &Task) -> anyhow::Result<()> {
        let Some(reminder_time) = task.reminder_time else {
            return Ok(());
        };

        if self.find_live_reminder(task.id).await.is_some() {
            debug!(task_id = task.id, "Reminder already scheduled, skipping");
            return Ok(());
        }

        let body = match task.due_date {
            Some(due) => format!(
                "\"{}\" is due {}",
                task.title,
                due_text(due, Utc::now().date_naive())
            ),
            None => format!("Don't forget: \"{}\"", task.title),
        };

        let mut draft = NotificationDraft::new("Task reminder", &body, reminder_time);
        draft.data = reminder_data(task.id, TASK_REMINDER);
        let notification = self.notifications.create(draft).await;
        info!(
            task_id = task.id,
            notification_id = %notification.id,
            at = %reminder_time.to_rfc3339(),
            "Scheduled task reminder"
        );
        self.scheduler.schedule(notification).await;
        Ok(())
    }

    /// Immediately notify about a task whose reminder time has passed.
    pub async fn send_overdue_reminder(&self, task: &Task) -> anyhow::Result<()> {
        let Some(reminder_time) = task.reminder_time else {
            return Ok(());
        };

        let now = Utc::now();
        let body = format!(
            "\"{}\" was due for a reminder {} ago",
            task.title,
            overdue_text(reminder_time, now)
        );

        let mut draft = NotificationDraft::new("Overdue task", &body, now);
        draft.data = reminder_data(task.id, OVERDUE_REMINDER);
        let notification = self.notifications.create(draft).await;
        info!(
            task_id = task.id,
            notification_id = %notification.id,
            "Sending overdue reminder"
        );
        // scheduled_time is now, so this takes the immediate delivery path.
        self.scheduler.schedule(notification).await;
        Ok(())
    }

    /// Derive reminders for every incomplete task whose reminder time falls
    /// inside the lookback window. One task's failure never aborts the batch.
    pub async fn schedule_all_task_reminders(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - self.lookback;
        let tasks = self.tasks.query_remindable(cutoff).await?;
        info!(count = tasks.len(), "Deriving reminders from task records");

        let mut processed = 0;
        for task in &tasks {
            if let Err(e) = self.route(task).await {
                error!(task_id = task.id, "Failed to derive reminder: {}", e);
                continue;
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Single-task variant of the same branching, used when a task is
    /// created or edited.
    pub async fn schedule_reminder_for_task(&self, task_id: i64) -> anyhow::Result<()> {
        match self.tasks.get_task(task_id).await? {
            Some(task) if task.is_complete => {
                debug!(task_id, "Task is complete, no reminder");
                Ok(())
            }
            Some(task) => self.route(&task).await,
            None => {
                warn!(task_id, "No such task, nothing to remind");
                Ok(())
            }
        }
    }

    /// Overdue-vs-future branch. The boundary is inclusive: a reminder time
    /// equal to now is already overdue.
    async fn route(&self, task: &Task) -> anyhow::Result<()> {
        match task.reminder_time {
            Some(at) if at <= Utc::now() => self.send_overdue_reminder(task).await,
            Some(_) => self.schedule_task_reminder(task).await,
            None => Ok(()),
        }
    }

    async fn find_live_reminder(&self, task_id: i64) -> Option<Notification> {
        self.notifications
            .list()
            .await
            .into_iter()
            .find(|n| {
                n.data.get("taskId") == Some(&json!(task_id))
                    && n.data.get("type") == Some(&json!(TASK_REMINDER))
            })
    }
}

fn reminder_data(task_id: i64, kind: &str) -> HashMap<String, serde_json::Value> {
    let mut data = HashMap::new();
    data.insert("taskId".to_string(), json!(task_id));
    data.insert("type".to_string(), json!(kind));
    data
}

/// Human-readable phrasing of a due date relative to today.
fn due_text(due: NaiveDate, today: NaiveDate) -> String {
    let days = (due - today).num_days();
    match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        d if d > 1 => format!("in {} days", d),
        d => format!("{} days ago", -d),
    }
}

/// How long past the reminder time we are, in the coarsest sensible unit.
fn overdue_text(reminder_time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (now - reminder_time).num_hours();
    if hours >= 48 {
        format!("{} days", hours / 24)
    } else if hours >= 2 {
        format!("{} hours", hours)
    } else if hours == 1 {
        "1 hour".to_string()
    } else {
        "less than an hour".to_string()
    }
}
