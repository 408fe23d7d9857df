use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::ErrorCategory;

/// Push endpoints that use the retired FCM/GCM send routes. The provider no
/// longer accepts them, so they fail the format invariant.
static LEGACY_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(fcm|gcm)/send/").expect("legacy endpoint pattern is valid"));

/// Capability credentials required by the push provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A push destination: one browser/device registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub timestamp: DateTime<Utc>,
    /// Last time a validation probe reached this endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(endpoint: &str, p256dh: &str, auth: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            keys: SubscriptionKeys {
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            },
            timestamp: Utc::now(),
            last_validated: None,
        }
    }

    /// Whether this record may be used for delivery: an https endpoint on the
    /// provider's current URL scheme (legacy `/fcm/send/` and `/gcm/send/`
    /// routes are rejected) with both credential keys present.
    pub fn is_valid_format(&self) -> bool {
        self.endpoint.starts_with("https://")
            && !LEGACY_ENDPOINT.is_match(&self.endpoint)
            && !self.keys.p256dh.is_empty()
            && !self.keys.auth.is_empty()
    }
}

/// A scheduled notification job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub scheduled_time: DateTime<Utc>,
    /// "none" or a period keyword. Persisted and logged at fire time, but no
    /// recurrence is derived from it.
    #[serde(default = "default_repeat")]
    pub repeat: String,
    pub created_at: DateTime<Utc>,
    /// Free-form correlation fields (e.g. `taskId`, `type`), merged into the
    /// push payload's data block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, Value>,
}

fn default_repeat() -> String {
    "none".to_string()
}

/// Input for creating a notification; the store assigns `id` and `createdAt`.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub title: String,
    pub body: String,
    pub scheduled_time: DateTime<Utc>,
    pub repeat: String,
    pub data: HashMap<String, Value>,
}

impl NotificationDraft {
    pub fn new(title: &str, body: &str, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            scheduled_time,
            repeat: default_repeat(),
            data: HashMap::new(),
        }
    }
}

/// A task record from the tracker's task repository. Read-only here — the
/// engine derives reminders from tasks but never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub reminder_type: Option<String>,
    pub is_complete: bool,
}

/// One failed dispatch retained for observability. Endpoints that fail with a
/// transient category stay subscribed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub category: ErrorCategory,
    pub message: String,
}

/// Aggregate outcome of one fan-out.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub success_count: usize,
    pub invalid_count: usize,
    pub total_attempted: usize,
    pub errors: Vec<DeliveryFailure>,
}

/// Aggregate outcome of a validation sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub error_count: usize,
}

/// Store size plus the moment it was sampled, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCount {
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}
