use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::delivery::DeliveryEngine;
use crate::types::Notification;

/// Map of notification id → armed timer task. Shared with the timer tasks
/// themselves so a firing timer can verify it is still armed.
type JobMap = Arc<RwLock<HashMap<String, JoinHandle<()>>>>;

/// Owns one timer per pending notification and invokes the delivery engine
/// when a notification comes due.
///
/// A single timer arming never waits longer than `cap`; a notification
/// further out than that sleeps the cap, wakes, re-checks the remaining wait
/// and re-arms. This keeps arbitrarily distant fire times working on top of
/// a bounded-delay timer primitive, and doubles as a periodic liveness
/// check.
pub struct Scheduler {
    delivery: Arc<DeliveryEngine>,
    jobs: JobMap,
    cap: Duration,
}

impl Scheduler {
    pub fn new(delivery: Arc<DeliveryEngine>, cap: Duration) -> Self {
        Self {
            delivery,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            cap,
        }
    }

    /// Arm a timer for `notification`, or deliver immediately if its
    /// scheduled time has already passed. Re-scheduling an id that already
    /// has a live timer replaces the old timer, so at most one is armed per
    /// notification.
    pub async fn schedule(&self, notification: Notification) {
        let remaining = notification.scheduled_time - Utc::now();
        if remaining <= chrono::Duration::zero() {
            info!(
                id = %notification.id,
                title = %notification.title,
                "Scheduled time already passed, delivering now"
            );
            deliver(&self.delivery, &notification).await;
            return;
        }

        self.cancel(&notification.id).await;

        info!(
            id = %notification.id,
            title = %notification.title,
            at = %notification.scheduled_time.to_rfc3339(),
            "Armed notification timer"
        );
        let id = notification.id.clone();
        let jobs = Arc::clone(&self.jobs);
        let delivery = Arc::clone(&self.delivery);
        let cap = self.cap;
        let handle = tokio::spawn(run_job(jobs, delivery, cap, notification));
        self.jobs.write().await.insert(id, handle);
    }

    /// Clear the timer for `id`. Idempotent: cancelling an unknown, fired,
    /// or already-cancelled id is a no-op.
    pub async fn cancel(&self, id: &str) {
        if let Some(handle) = self.jobs.write().await.remove(id) {
            handle.abort();
            info!(id, "Cancelled notification timer");
        }
    }

    /// Number of currently armed timers.
    pub async fn armed_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

async fn run_job(
    jobs: JobMap,
    delivery: Arc<DeliveryEngine>,
    cap: Duration,
    notification: Notification,
) {
    loop {
        let remaining = notification.scheduled_time - Utc::now();
        if remaining <= chrono::Duration::zero() {
            break;
        }
        // The armed delay may be capped below the true remaining wait;
        // waking early just loops back here and re-arms.
        let wait = remaining.to_std().unwrap_or_default().min(cap);
        tokio::time::sleep(wait).await;
    }

    // A cancel that raced this wake-up wins: deliver only while the id is
    // still armed.
    if jobs.write().await.remove(&notification.id).is_none() {
        return;
    }

    deliver(&delivery, &notification).await;

    if notification.repeat != "none" && !notification.repeat.is_empty() {
        // The repeat field is stored and reported but no recurrence is
        // derived from it; the record stays in the store either way.
        info!(
            id = %notification.id,
            repeat = %notification.repeat,
            "Notification is marked to repeat, leaving record in place"
        );
    }
}

/// Delivery failures are isolated here: they are logged and never propagate
/// to other pending notifications.
async fn deliver(delivery: &DeliveryEngine, notification: &Notification) {
    match delivery.send_to_all(notification).await {
        Ok(summary) => info!(
            id = %notification.id,
            success = summary.success_count,
            invalid = summary.invalid_count,
            errors = summary.errors.len(),
            "Notification fired"
        ),
        Err(e) => error!(id = %notification.id, "Delivery failed: {}", e),
    }
}
