//! Record store seams used by the poller and the API.
//!
//! The poller only depends on these traits; `SqliteStore` is the bundled
//! adapter backed by a single local SQLite connection. Its async methods run
//! the blocking rusqlite calls on tokio's blocking pool.

use crate::db::{Database, Reminder, ReminderStatus, Task};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn list_by_task(&self, task_id: i64) -> Result<Vec<Reminder>>;

    /// Reminders with status `Scheduled` and `scheduled_at <= now`.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>>;

    async fn create(&self, task_id: i64, scheduled_at: DateTime<Utc>) -> Result<Reminder>;

    async fn update_status(&self, id: i64, status: ReminderStatus) -> Result<Reminder>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<Task>>;

    async fn create(&self, title: &str, due_date: Option<NaiveDate>) -> Result<Task>;

    async fn list(&self) -> Result<Vec<Task>>;
}

#[derive(Clone)]
pub struct SqliteStore {
    database: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn new(database: Database) -> Self {
        Self {
            database: Arc::new(Mutex::new(database)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.database
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned"))
    }

    pub fn count_reminders(&self, status: ReminderStatus) -> Result<i64> {
        self.lock()?.count_reminders(status)
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let database = store.lock()?;
            work(&database)
        })
        .await
            .context("SQLite worker task failed")?
    }
}

#[async_trait]
impl ReminderStore for SqliteStore {
    async fn list_by_task(&self, task_id: i64) -> Result<Vec<Reminder>> {
        self.blocking(move |db| db.reminders_for_task(task_id)).await
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        self.blocking(move |db| db.due_reminders(now)).await
    }

    async fn create(&self, task_id: i64, scheduled_at: DateTime<Utc>) -> Result<Reminder> {
        self.blocking(move |db| db.insert_reminder(task_id, scheduled_at))
            .await
    }

    async fn update_status(&self, id: i64, status: ReminderStatus) -> Result<Reminder> {
        self.blocking(move |db| db.set_reminder_status(id, status)).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.blocking(move |db| db.delete_reminder(id)).await
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<Task>> {
        self.blocking(move |db| db.task(id)).await
    }

    async fn create(&self, title: &str, due_date: Option<NaiveDate>) -> Result<Task> {
        let title = title.to_string();
        self.blocking(move |db| db.insert_task(&title, due_date)).await
    }

    async fn list(&self) -> Result<Vec<Task>> {
        self.blocking(|db| db.list_tasks()).await
    }
}
