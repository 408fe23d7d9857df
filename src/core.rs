use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::api::NotificationService;
use crate::config::AppConfig;
use crate::cron;
use crate::delivery::DeliveryEngine;
use crate::provider::HttpPushProvider;
use crate::reminders::ReminderDeriver;
use crate::scheduler::Scheduler;
use crate::store::{JsonNotificationStore, JsonSubscriptionStore};
use crate::tasks::SqliteTaskRepo;
use crate::traits::{NotificationStore, PushProvider, SubscriptionStore, TaskRepository};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Stores
    let data_dir = Path::new(&config.storage.data_dir);
    tokio::fs::create_dir_all(data_dir).await?;
    let subscriptions: Arc<dyn SubscriptionStore> = Arc::new(
        JsonSubscriptionStore::open(data_dir.join("subscriptions.json")).await,
    );
    let notifications: Arc<dyn NotificationStore> = Arc::new(
        JsonNotificationStore::open(data_dir.join("notifications.json")).await,
    );

    // 2. Prune invalid-format subscriptions before first use
    let invalid: Vec<String> = subscriptions
        .list()
        .await
        .into_iter()
        .filter(|s| !s.is_valid_format())
        .map(|s| s.endpoint)
        .collect();
    if !invalid.is_empty() {
        let removed = subscriptions.remove_by_endpoints(&invalid).await;
        info!(removed, "Pruned invalid-format subscriptions on startup");
    }

    // 3. Push provider
    if config.provider.vapid_public_key.is_empty() || config.provider.vapid_private_key.is_empty()
    {
        warn!("VAPID key pair not configured; push endpoints may reject deliveries");
    }
    let provider: Arc<dyn PushProvider> = Arc::new(HttpPushProvider::new(&config.provider)?);

    // 4. Delivery engine + scheduler
    let delivery = Arc::new(DeliveryEngine::new(
        Arc::clone(&subscriptions),
        Arc::clone(&provider),
        config.delivery.icon.clone(),
    ));
    let cap = Duration::from_secs(config.scheduler.timer_cap_hours * 3600);
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&delivery), cap));

    // 5. Re-arm every persisted notification; past ones deliver right away
    let pending = notifications.list().await;
    info!(count = pending.len(), "Re-arming persisted notifications");
    for notification in pending {
        scheduler.schedule(notification).await;
    }

    // 6. Task repository + reminder deriver
    let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepo::new(&config.tasks.db_path).await?);
    let deriver = Arc::new(ReminderDeriver::new(
        Arc::clone(&tasks),
        Arc::clone(&notifications),
        Arc::clone(&scheduler),
        config.reminders.lookback_hours,
    ));

    // 7. Service facade (validation sweeps and housekeeping run through it;
    //    the HTTP layer of the tracker consumes the same operations)
    let service = Arc::new(NotificationService::new(
        Arc::clone(&subscriptions),
        Arc::clone(&notifications),
        Arc::clone(&tasks),
        Arc::clone(&scheduler),
        Arc::clone(&delivery),
        Arc::clone(&provider),
    ));

    // 8. Startup sweeps: validate endpoints after a short warm-up, and catch
    //    up on reminders for tasks touched while the daemon was down
    let warmup = Duration::from_secs(config.validator.warmup_secs);
    let service_for_warmup = Arc::clone(&service);
    tokio::spawn(async move {
        tokio::time::sleep(warmup).await;
        match service_for_warmup.validate_subscriptions().await {
            Ok(summary) => info!(
                valid = summary.valid_count,
                invalid = summary.invalid_count,
                errors = summary.error_count,
                "Startup validation sweep finished"
            ),
            Err(e) => error!("Startup validation sweep failed: {}", e),
        }
    });
    let deriver_for_startup = Arc::clone(&deriver);
    tokio::spawn(async move {
        if let Err(e) = deriver_for_startup.schedule_all_task_reminders().await {
            error!("Startup reminder derivation failed: {}", e);
        }
    });

    // 9. Recurring jobs
    let service_for_validation = Arc::clone(&service);
    cron::spawn_job(
        "validate-subscriptions",
        config.validator.schedule.clone(),
        move || {
            let service = Arc::clone(&service_for_validation);
            async move { service.validate_subscriptions().await.map(|_| ()) }
        },
    );
    let deriver_for_job = Arc::clone(&deriver);
    cron::spawn_job(
        "derive-task-reminders",
        config.reminders.schedule.clone(),
        move || {
            let deriver = Arc::clone(&deriver_for_job);
            async move { deriver.schedule_all_task_reminders().await.map(|_| ()) }
        },
    );
    let service_for_housekeeping = Arc::clone(&service);
    cron::spawn_job(
        "housekeeping",
        config.housekeeping.schedule.clone(),
        move || {
            let service = Arc::clone(&service_for_housekeeping);
            async move {
                let removed = service.clean_invalid_subscriptions().await;
                if removed > 0 {
                    info!(removed, "Housekeeping pruned invalid subscriptions");
                }
                Ok(())
            }
        },
    );

    // 10. Run until shutdown. Timers die with the process; re-arming from
    //     the persisted stores recovers them on the next start.
    info!("notifyd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    let armed = scheduler.armed_count().await;
    info!(armed, "Shutting down");
    Ok(())
}
