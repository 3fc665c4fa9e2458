pub mod queries;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub due_date: Option<NaiveDate>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Scheduled,
    Sent,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReminderStatus::Scheduled => "scheduled",
            ReminderStatus::Sent => "sent",
        }
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "scheduled" => Ok(ReminderStatus::Scheduled),
            "sent" => Ok(ReminderStatus::Sent),
            other => Err(anyhow!("Unknown reminder status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Reminder {
    pub id: i64,
    pub task_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub status: ReminderStatus,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub fn insert_task(&self, title: &str, due_date: Option<NaiveDate>) -> Result<Task> {
        let title = title.trim();
        if title.is_empty() {
            bail!("Task title must not be empty");
        }

        let created_at = Utc::now().timestamp();
        let due = due_date.map(|date| date.format("%Y-%m-%d").to_string());

        self.conn
            .execute(
                "INSERT INTO tasks (title, due_date, created_at) VALUES (?1, ?2, ?3)",
                params![title, due, created_at],
            )
            .context("Failed to insert task")?;

        Ok(Task {
            id: self.conn.last_insert_rowid(),
            title: title.to_string(),
            due_date,
            created_at,
        })
    }

    pub fn task(&self, id: i64) -> Result<Option<Task>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, title, due_date, created_at FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query task {id}"))?;

        Ok(row)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut statement = self.conn.prepare(
            "SELECT id, title, due_date, created_at
             FROM tasks
             ORDER BY created_at DESC, id DESC",
        )?;

        let rows = statement
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list tasks")?;

        Ok(rows)
    }

    pub fn insert_reminder(&self, task_id: i64, scheduled_at: DateTime<Utc>) -> Result<Reminder> {
        self.conn
            .execute(
                "INSERT INTO reminders (task_id, scheduled_at, status) VALUES (?1, ?2, ?3)",
                params![
                    task_id,
                    scheduled_at.timestamp(),
                    ReminderStatus::Scheduled.as_str()
                ],
            )
            .context("Failed to insert reminder")?;

        Ok(Reminder {
            id: self.conn.last_insert_rowid(),
            task_id,
            scheduled_at: truncate_to_seconds(scheduled_at)?,
            status: ReminderStatus::Scheduled,
        })
    }

    pub fn reminders_for_task(&self, task_id: i64) -> Result<Vec<Reminder>> {
        let mut statement = self.conn.prepare(
            "SELECT id, task_id, scheduled_at, status
             FROM reminders
             WHERE task_id = ?1
             ORDER BY scheduled_at ASC",
        )?;

        let rows = statement
            .query_map(params![task_id], reminder_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to query reminders for task {task_id}"))?;

        Ok(rows)
    }

    pub fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let mut statement = self.conn.prepare(
            "SELECT id, task_id, scheduled_at, status
             FROM reminders
             WHERE status = ?1 AND scheduled_at <= ?2
             ORDER BY scheduled_at ASC, id ASC",
        )?;

        let rows = statement
            .query_map(
                params![ReminderStatus::Scheduled.as_str(), now.timestamp()],
                reminder_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query due reminders")?;

        Ok(rows)
    }

    pub fn reminder(&self, id: i64) -> Result<Option<Reminder>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, task_id, scheduled_at, status FROM reminders WHERE id = ?1",
                params![id],
                reminder_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query reminder {id}"))?;

        Ok(row)
    }

    pub fn set_reminder_status(&self, id: i64, status: ReminderStatus) -> Result<Reminder> {
        let updated = self
            .conn
            .execute(
                "UPDATE reminders SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .with_context(|| format!("Failed to update reminder {id}"))?;

        if updated == 0 {
            bail!("Reminder not found: {id}");
        }

        self.reminder(id)?
            .with_context(|| format!("Reminder disappeared after update: {id}"))
    }

    pub fn delete_reminder(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete reminder {id}"))?;

        Ok(deleted > 0)
    }

    pub fn count_reminders(&self, status: ReminderStatus) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM reminders WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count reminders")
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let due_date: Option<String> = row.get(2)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        due_date: due_date.and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok()),
        created_at: row.get(3)?,
    })
}

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let scheduled_at: i64 = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(Reminder {
        id: row.get(0)?,
        task_id: row.get(1)?,
        scheduled_at: DateTime::from_timestamp(scheduled_at, 0).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(2, scheduled_at)
        })?,
        status: status.parse().map_err(|error: anyhow::Error| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                error.into(),
            )
        })?,
    })
}

fn truncate_to_seconds(value: DateTime<Utc>) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(value.timestamp(), 0)
        .with_context(|| format!("Timestamp out of range: {value}"))
}
