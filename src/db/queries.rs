pub const CREATE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  title       TEXT NOT NULL,
  due_date    TEXT,
  created_at  INTEGER NOT NULL
);
"#;

pub const CREATE_REMINDERS: &str = r#"
CREATE TABLE IF NOT EXISTS reminders (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  task_id       INTEGER NOT NULL,
  scheduled_at  INTEGER NOT NULL,
  status        TEXT NOT NULL DEFAULT 'scheduled'
);
"#;

pub const INDEX_REMINDERS_DUE: &str =
    "CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(status, scheduled_at);";

pub const INDEX_REMINDERS_TASK: &str =
    "CREATE INDEX IF NOT EXISTS idx_reminders_task ON reminders(task_id);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_TASKS,
        CREATE_REMINDERS,
        INDEX_REMINDERS_DUE,
        INDEX_REMINDERS_TASK,
    ]
}
