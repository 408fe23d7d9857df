use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::traits::TaskRepository;
use crate::types::Task;

/// Read-only view over the tracker application's `tasks` table. The tracker
/// owns the schema and every write; this repository only derives reminders
/// from it.
pub struct SqliteTaskRepo {
    pool: SqlitePool,
}

impl SqliteTaskRepo {
    pub async fn new(db_path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Task {
        let reminder_raw: Option<String> = row.get("reminder_time");
        let due_raw: Option<String> = row.get("due_date");
        Task {
            id: row.get("id"),
            title: row.get("title"),
            due_date: due_raw.as_deref().and_then(parse_date),
            reminder_time: reminder_raw.as_deref().and_then(parse_timestamp),
            reminder_type: row.get("reminder_type"),
            is_complete: row.get::<i64, _>("is_complete") != 0,
        }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepo {
    async fn query_remindable(&self, not_older_than: DateTime<Utc>) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, title, due_date, reminder_time, reminder_type, is_complete
             FROM tasks
             WHERE reminder_time IS NOT NULL
               AND is_complete = 0
               AND reminder_time > ?
             ORDER BY reminder_time ASC",
        )
        .bind(not_older_than.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::task_from_row).collect())
    }

    async fn get_task(&self, id: i64) -> anyhow::Result<Option<Task>> {
        let row = sqlx::query(
            "SELECT id, title, due_date, reminder_time, reminder_type, is_complete
             FROM tasks
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::task_from_row))
    }
}

/// Task rows written by the web app carry minute-precision timestamps
/// without a zone; newer rows are full RFC 3339. Accept both, assume UTC for
/// zoneless values.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok();
    if naive.is_none() {
        warn!(raw, "Unparseable reminder_time on task row");
    }
    naive.map(|n| Utc.from_utc_datetime(&n))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
