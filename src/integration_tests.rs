//! End-to-end scenarios wiring real file-backed stores, the delivery
//! engine, the scheduler, and the reminder deriver against a scripted
//! push provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::api::NotificationService;
use crate::delivery::DeliveryEngine;
use crate::reminders::ReminderDeriver;
use crate::scheduler::Scheduler;
use crate::store::{JsonNotificationStore, JsonSubscriptionStore};
use crate::testing::{task_with_reminder, MemoryTaskRepo, MockPushProvider};
use crate::traits::{
    NotificationStore, PushProvider, SubscriptionStore, TaskRepository,
};
use crate::types::{NotificationDraft, Subscription};

struct Harness {
    service: NotificationService,
    deriver: ReminderDeriver,
    scheduler: Arc<Scheduler>,
    subscriptions: Arc<dyn SubscriptionStore>,
    notifications: Arc<dyn NotificationStore>,
    tasks: Arc<MemoryTaskRepo>,
    provider: Arc<MockPushProvider>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let subscriptions: Arc<dyn SubscriptionStore> = Arc::new(
        JsonSubscriptionStore::open(dir.path().join("subscriptions.json")).await,
    );
    let notifications: Arc<dyn NotificationStore> = Arc::new(
        JsonNotificationStore::open(dir.path().join("notifications.json")).await,
    );
    let tasks = Arc::new(MemoryTaskRepo::default());
    let provider = Arc::new(MockPushProvider::default());
    let delivery = Arc::new(DeliveryEngine::new(
        Arc::clone(&subscriptions),
        Arc::clone(&provider) as Arc<dyn PushProvider>,
        "/icon-192x192.png".to_string(),
    ));
    let scheduler = Arc::new(Scheduler::new(Arc::clone(&delivery), Duration::from_secs(3600)));
    let service = NotificationService::new(
        Arc::clone(&subscriptions),
        Arc::clone(&notifications),
        Arc::clone(&tasks) as Arc<dyn TaskRepository>,
        Arc::clone(&scheduler),
        Arc::clone(&delivery),
        Arc::clone(&provider) as Arc<dyn PushProvider>,
    );
    let deriver = ReminderDeriver::new(
        Arc::clone(&tasks) as Arc<dyn TaskRepository>,
        Arc::clone(&notifications),
        Arc::clone(&scheduler),
        24,
    );
    Harness {
        service,
        deriver,
        scheduler,
        subscriptions,
        notifications,
        tasks,
        provider,
        _dir: dir,
    }
}

#[tokio::test]
async fn current_format_is_listed_valid_while_legacy_is_not() {
    let harness = harness().await;

    harness
        .service
        .save_subscription(Subscription::new("https://push.example/wp/abc", "x", "y"))
        .await
        .unwrap();
    let valid = harness.subscriptions.list_valid().await;
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].endpoint, "https://push.example/wp/abc");

    harness
        .service
        .save_subscription(Subscription::new(
            "https://push.example/fcm/send/abc",
            "x",
            "y",
        ))
        .await
        .unwrap();
    let valid = harness.subscriptions.list_valid().await;
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].endpoint, "https://push.example/wp/abc");
}

#[tokio::test]
async fn past_scheduled_time_delivers_immediately_to_every_valid_subscription() {
    let harness = harness().await;
    for i in 0..2 {
        harness
            .service
            .save_subscription(Subscription::new(
                &format!("https://push.example/wp/{}", i),
                "x",
                "y",
            ))
            .await
            .unwrap();
    }

    harness
        .service
        .schedule_notification(NotificationDraft::new(
            "T",
            "B",
            Utc::now() - chrono::Duration::seconds(1),
        ))
        .await;

    assert_eq!(harness.provider.sent_endpoints().await.len(), 2);
    assert_eq!(harness.scheduler.armed_count().await, 0);
}

#[tokio::test]
async fn mixed_failures_prune_only_the_gone_endpoint() {
    let harness = harness().await;
    harness
        .service
        .save_subscription(Subscription::new("https://push.example/wp/gone", "x", "y"))
        .await
        .unwrap();
    harness
        .service
        .save_subscription(Subscription::new("https://push.example/wp/flaky", "x", "y"))
        .await
        .unwrap();
    harness
        .provider
        .fail_with_status("https://push.example/wp/gone", 410)
        .await;
    harness
        .provider
        .fail_with_status("https://push.example/wp/flaky", 500)
        .await;

    let summary = harness.service.send_test_notification().await.unwrap();

    assert_eq!(summary.invalid_count, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].category.as_str(), "server_error");
    let remaining = harness.subscriptions.list().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].endpoint, "https://push.example/wp/flaky");
}

#[tokio::test]
async fn task_reminder_lifecycle_dedup_and_recreate() {
    let harness = harness().await;
    harness
        .service
        .save_subscription(Subscription::new("https://push.example/wp/dev", "x", "y"))
        .await
        .unwrap();

    let mut task = task_with_reminder(
        42,
        "Pay rent",
        Some(Utc::now() + chrono::Duration::seconds(10)),
    );
    task.due_date = Some(Utc::now().date_naive() + chrono::Duration::days(1));
    harness.tasks.insert(task.clone()).await;

    harness.deriver.schedule_task_reminder(&task).await.unwrap();
    let created = harness.service.list_notifications().await;
    assert_eq!(created.len(), 1);
    assert!(created[0].body.contains("tomorrow"));

    // A second derivation is a no-op while the notification is live.
    harness.deriver.schedule_task_reminder(&task).await.unwrap();
    assert_eq!(harness.service.list_notifications().await.len(), 1);

    // Deleting it makes the task remindable again.
    let first_id = created[0].id.clone();
    harness.service.delete_notification(&first_id).await.unwrap();
    harness.deriver.schedule_task_reminder(&task).await.unwrap();
    let recreated = harness.service.list_notifications().await;
    assert_eq!(recreated.len(), 1);
    assert_ne!(recreated[0].id, first_id);
}

#[tokio::test]
async fn stores_reload_identically_and_rearm_with_recomputed_delay() {
    let dir = tempfile::tempdir().unwrap();
    let sub_path = dir.path().join("subscriptions.json");
    let notif_path = dir.path().join("notifications.json");

    let (saved_subscription, saved_notification) = {
        let subscriptions = JsonSubscriptionStore::open(&sub_path).await;
        let notifications = JsonNotificationStore::open(&notif_path).await;
        subscriptions
            .upsert(Subscription::new("https://push.example/wp/a", "x", "y"))
            .await
            .unwrap();
        let mut draft = NotificationDraft::new(
            "Later",
            "B",
            Utc::now() + chrono::Duration::milliseconds(150),
        );
        draft
            .data
            .insert("taskId".to_string(), serde_json::json!(42));
        let notification = notifications.create(draft).await;
        (subscriptions.list().await.remove(0), notification)
    };

    // Fresh process: reload both stores and re-arm from persisted state.
    let subscriptions: Arc<dyn SubscriptionStore> =
        Arc::new(JsonSubscriptionStore::open(&sub_path).await);
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(JsonNotificationStore::open(&notif_path).await);

    let reloaded_subscriptions = subscriptions.list().await;
    assert_eq!(reloaded_subscriptions, vec![saved_subscription]);
    let reloaded = notifications.list().await;
    assert_eq!(reloaded, vec![saved_notification]);

    let provider = Arc::new(MockPushProvider::default());
    let delivery = Arc::new(DeliveryEngine::new(
        Arc::clone(&subscriptions),
        Arc::clone(&provider) as Arc<dyn PushProvider>,
        "/icon.png".to_string(),
    ));
    let scheduler = Scheduler::new(delivery, Duration::from_secs(3600));
    for notification in reloaded {
        scheduler.schedule(notification).await;
    }
    assert_eq!(scheduler.armed_count().await, 1);

    // The recomputed delay still honors the original fire time.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(provider.sent_endpoints().await.len(), 1);
    assert_eq!(scheduler.armed_count().await, 0);
}

#[tokio::test]
async fn distant_fire_times_survive_the_timer_cap() {
    let harness = harness().await;
    harness
        .service
        .save_subscription(Subscription::new("https://push.example/wp/a", "x", "y"))
        .await
        .unwrap();

    // Cap far below the scheduled delay forces re-arm cycles.
    let delivery = Arc::new(DeliveryEngine::new(
        Arc::clone(&harness.subscriptions),
        Arc::clone(&harness.provider) as Arc<dyn PushProvider>,
        "/icon.png".to_string(),
    ));
    let capped = Scheduler::new(delivery, Duration::from_millis(40));
    let notification = harness
        .notifications
        .create(NotificationDraft::new(
            "Far out",
            "B",
            Utc::now() + chrono::Duration::milliseconds(200),
        ))
        .await;
    capped.schedule(notification).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.provider.sent_endpoints().await.is_empty());
    assert_eq!(capped.armed_count().await, 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(harness.provider.sent_endpoints().await.len(), 1);
}
