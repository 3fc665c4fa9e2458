pub mod onboard;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "taskpulse", about = "Task reminders and notification center")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Init {
        #[arg(long, default_value_t = false)]
        enable_notifications: bool,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Status,
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    Remind {
        #[command(subcommand)]
        command: RemindCommands,
    },
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },
    /// Run one reminder cycle now
    Poll,
    /// Run the poller and local API until interrupted
    Service,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    Add {
        title: String,
        /// Due date, YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
pub enum RemindCommands {
    Add {
        task_id: i64,
        /// Local time "YYYY-MM-DD HH:MM" or RFC 3339
        #[arg(long)]
        at: String,
    },
    List {
        task_id: i64,
    },
    Remove {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum NotifyCommands {
    Enable,
}
