use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding subscriptions.json and notifications.json.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// VAPID key pair identifying this server to push endpoints.
    #[serde(default)]
    pub vapid_public_key: String,
    #[serde(default)]
    pub vapid_private_key: String,
    /// Contact URI sent alongside the keys (mailto: or https:).
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Per-request timeout; expiry surfaces as a network-category failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// TTL the push service may hold an undelivered message for.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: String::new(),
            vapid_private_key: String::new(),
            subject: default_subject(),
            timeout_secs: default_timeout_secs(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_subject() -> String {
    "mailto:admin@localhost".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_ttl_secs() -> u64 {
    86_400
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Icon path included in every push payload.
    #[serde(default = "default_icon")]
    pub icon: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            icon: default_icon(),
        }
    }
}

fn default_icon() -> String {
    "/icon-192x192.png".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Maximum delay a single timer arming may request. Waits longer than
    /// this re-arm after the cap elapses.
    #[serde(default = "default_timer_cap_hours")]
    pub timer_cap_hours: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timer_cap_hours: default_timer_cap_hours(),
        }
    }
}

fn default_timer_cap_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    /// Delay before the startup validation sweep.
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    /// 5-field cron expression for the recurring sweep.
    #[serde(default = "default_validator_schedule")]
    pub schedule: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup_secs(),
            schedule: default_validator_schedule(),
        }
    }
}

fn default_warmup_secs() -> u64 {
    30
}

fn default_validator_schedule() -> String {
    // Sundays at 03:00
    "0 3 * * 0".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemindersConfig {
    /// 5-field cron expression for the daily reminder derivation.
    #[serde(default = "default_reminders_schedule")]
    pub schedule: String,
    /// Reminder times older than this are ignored by the batch.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            schedule: default_reminders_schedule(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

fn default_reminders_schedule() -> String {
    "0 6 * * *".to_string()
}

fn default_lookback_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct HousekeepingConfig {
    /// 5-field cron expression for the daily cleanup pass.
    #[serde(default = "default_housekeeping_schedule")]
    pub schedule: String,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            schedule: default_housekeeping_schedule(),
        }
    }
}

fn default_housekeeping_schedule() -> String {
    "0 0 * * *".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    /// SQLite database of the tracker application. Opened read-only in
    /// spirit: this daemon only queries the tasks table.
    #[serde(default = "default_tasks_db")]
    pub db_path: String,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            db_path: default_tasks_db(),
        }
    }
}

fn default_tasks_db() -> String {
    "data/tracker.db".to_string()
}
