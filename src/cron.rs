use std::future::Future;

use chrono::Utc;
use croner::Cron;
use tracing::{debug, error, info};

/// Spawn a recurring job: compute the next occurrence of `schedule`, sleep
/// until then, run the handler, repeat. Handler failures are logged and the
/// loop keeps going; an unparseable schedule disables the job.
pub fn spawn_job<F, Fut>(name: &'static str, schedule: String, handler: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    tokio::spawn(async move {
        let cron: Cron = match schedule.parse() {
            Ok(cron) => cron,
            Err(e) => {
                error!(job = name, schedule = %schedule, "Invalid cron expression, job disabled: {}", e);
                return;
            }
        };
        info!(job = name, schedule = %schedule, "Recurring job armed");

        loop {
            let next = match cron.find_next_occurrence(&Utc::now(), false) {
                Ok(next) => next,
                Err(e) => {
                    error!(job = name, "No next occurrence, job stopped: {}", e);
                    return;
                }
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            debug!(job = name, at = %next.to_rfc3339(), "Sleeping until next run");
            tokio::time::sleep(wait).await;

            info!(job = name, "Running recurring job");
            if let Err(e) = handler().await {
                error!(job = name, "Recurring job failed: {}", e);
            }
        }
    });
}
