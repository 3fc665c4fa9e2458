mod api;
mod cli;
mod config;
mod db;
mod notify;
mod poller;
mod store;

use crate::cli::onboard::run_onboarding;
use crate::cli::{
    Cli, Commands, ConfigCommands, NotifyCommands, RemindCommands, TaskCommands,
};
use crate::config::Config;
use crate::db::ReminderStatus;
use crate::notify::banner::BannerBoard;
use crate::notify::log::SharedNotificationLog;
use crate::notify::platform::TerminalNotifier;
use crate::notify::{AppEvent, DispatchError, NotificationDispatcher, describe_due_date};
use crate::poller::ReminderPoller;
use crate::store::{ReminderStore, SqliteStore, TaskStore};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use clap::Parser;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            enable_notifications,
        } => {
            let onboarding = run_onboarding(enable_notifications)?;
            if onboarding.enable_notifications {
                enable_notifications_for(onboarding.config).await?;
            }
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Status => handle_status(),
        Commands::Task { command } => handle_task_command(command).await,
        Commands::Remind { command } => handle_remind_command(command).await,
        Commands::Notify { command } => match command {
            NotifyCommands::Enable => enable_notifications_for(load_config()?).await,
        },
        Commands::Poll => handle_poll().await,
        Commands::Service => {
            let config = load_config()?;
            run_service(config).await
        }
    }
}

struct Services {
    store: SqliteStore,
    dispatcher: Arc<NotificationDispatcher>,
    banners: Arc<BannerBoard>,
    log: SharedNotificationLog,
    poller: Arc<ReminderPoller>,
}

impl Services {
    fn build(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path)?;
        let platform = Arc::new(TerminalNotifier::new(
            config.notification_permission,
            &config.api_base_url(),
        )?);
        let banners = Arc::new(BannerBoard::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            platform,
            banners.clone(),
            config.banner_duration_ms,
        ));
        dispatcher.init();

        let log = SharedNotificationLog::default();
        let store_handle = Arc::new(store.clone());
        let poller = Arc::new(ReminderPoller::new(
            store_handle.clone(),
            store_handle,
            Arc::clone(&dispatcher),
            log.clone(),
            Duration::from_secs(config.poll_seconds),
        ));

        Ok(Self {
            store,
            dispatcher,
            banners,
            log,
            poller,
        })
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            println!("Config saved: {key} = {value}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let store = SqliteStore::open(&config.db_path)?;

    println!("taskpulse status");
    println!("- db_path: {}", config.db_path.display());
    println!("- api: {}", config.api_base_url());
    println!("- poll_seconds: {}", config.poll_seconds);
    println!(
        "- notification_permission: {}",
        config.notification_permission
    );
    println!(
        "- scheduled_reminders: {}",
        store.count_reminders(ReminderStatus::Scheduled)?
    );
    println!(
        "- sent_reminders: {}",
        store.count_reminders(ReminderStatus::Sent)?
    );

    Ok(())
}

async fn handle_task_command(command: TaskCommands) -> Result<()> {
    let config = load_config()?;
    let store = SqliteStore::open(&config.db_path)?;

    match command {
        TaskCommands::Add { title, due } => {
            let due_date = due.as_deref().map(parse_date).transpose()?;
            let task = TaskStore::create(&store, &title, due_date).await?;
            println!("Task {} created: {}", task.id, task.title);
        }
        TaskCommands::List => {
            let tasks = store.list().await?;
            if tasks.is_empty() {
                println!("No tasks yet. Add one with `taskpulse task add <title>`.");
            }
            tasks.iter().for_each(|task| {
                println!(
                    "{:>4}  {}  (due {})",
                    task.id,
                    task.title,
                    describe_due_date(task.due_date)
                );
            });
        }
    }

    Ok(())
}

async fn handle_remind_command(command: RemindCommands) -> Result<()> {
    let config = load_config()?;
    let store = SqliteStore::open(&config.db_path)?;

    match command {
        RemindCommands::Add { task_id, at } => {
            let task = store
                .get_by_id(task_id)
                .await?
                .with_context(|| format!("Task not found: {task_id}"))?;
            let scheduled_at = parse_reminder_time(&at)?;
            let reminder = ReminderStore::create(&store, task.id, scheduled_at).await?;

            println!(
                "Reminder {} set for \"{}\" at {}",
                reminder.id,
                task.title,
                reminder
                    .scheduled_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
            );
        }
        RemindCommands::List { task_id } => {
            let reminders = store.list_by_task(task_id).await?;
            if reminders.is_empty() {
                println!("No reminders for task {task_id}");
            }
            reminders.iter().for_each(|reminder| {
                println!(
                    "{:>4}  {}  {}",
                    reminder.id,
                    reminder
                        .scheduled_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M"),
                    reminder.status
                );
            });
        }
        RemindCommands::Remove { id } => {
            if !store.delete(id).await? {
                bail!("Reminder not found: {id}");
            }
            println!("Reminder {id} deleted");
        }
    }

    Ok(())
}

async fn handle_poll() -> Result<()> {
    let config = load_config()?;
    let report = api::client::request_cycle(&config.api_base_url()).await?;

    println!(
        "Reminder cycle: {} due, {} delivered, {} skipped, {} failed",
        report.due, report.delivered, report.skipped, report.failed
    );
    if report.fetch_failed {
        println!("Due reminders could not be fetched; see service log output.");
    }

    Ok(())
}

async fn enable_notifications_for(mut config: Config) -> Result<()> {
    let services = Services::build(&config)?;
    let result = request_and_record_permission(&services.dispatcher, &mut config).await;

    config.save()?;
    services.dispatcher.dispose();

    match result {
        Ok(()) => {
            println!("Notifications enabled! You'll receive reminder alerts.");
            Ok(())
        }
        Err(DispatchError::PermissionDenied) => bail!(
            "Could not enable notifications. Reset with `taskpulse config set notifications.permission default` and try again."
        ),
        Err(DispatchError::Unsupported) => bail!(
            "Desktop notifications need terminal-notifier on macOS. Reminders will show as in-app banners."
        ),
        Err(error) => Err(error.into()),
    }
}

/// Only an answered (or previously settled) prompt changes the stored state.
async fn request_and_record_permission(
    dispatcher: &NotificationDispatcher,
    config: &mut Config,
) -> Result<(), DispatchError> {
    let result = dispatcher.request_permission().await;

    if matches!(result, Ok(()) | Err(DispatchError::PermissionDenied)) {
        config.notification_permission = dispatcher.permission();
    }

    result
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let shared_config = Arc::new(config);
    let services = Services::build(&shared_config)?;

    let focused_task = Arc::new(Mutex::new(None));
    let navigation = track_navigation(services.dispatcher.subscribe(), Arc::clone(&focused_task));

    let state = api::routes::ApiState {
        config: Arc::clone(&shared_config),
        store: services.store.clone(),
        dispatcher: Arc::clone(&services.dispatcher),
        banners: Arc::clone(&services.banners),
        log: services.log.clone(),
        poller: Arc::clone(&services.poller),
        focused_task,
    };

    services.poller.start();
    info!("taskpulse service started");

    let outcome = tokio::select! {
        api_result = api::run_server(state) => api_result,
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    services.poller.stop();
    services.dispatcher.dispose();
    navigation.abort();

    outcome
}

fn track_navigation(
    mut events: broadcast::Receiver<AppEvent>,
    focused_task: Arc<Mutex<Option<i64>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AppEvent::NavigateToTask(task_id)) => {
                    info!(task_id, "navigate to task");
                    *focused_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task_id);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "navigation events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format: {input}. Example: 2026-02-18"))
}

fn parse_reminder_time(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(input.trim(), "%Y-%m-%d %H:%M").with_context(|| {
        format!("Invalid reminder time: {input}. Example: 2026-02-18 09:00")
    })?;

    naive
        .and_local_timezone(Local)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .with_context(|| format!("Ambiguous or skipped local time: {input}"))
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| "Config file not found. Run `taskpulse init` first.".to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_date, parse_reminder_time, request_and_record_permission};
    use crate::config::Config;
    use crate::notify::banner::BannerBoard;
    use crate::notify::testing::FakePlatform;
    use crate::notify::{DispatchError, NotificationDispatcher, PermissionState};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn dispatcher_for(platform: FakePlatform) -> NotificationDispatcher {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(platform), Arc::new(BannerBoard::default()), 5000);
        dispatcher.init();
        dispatcher
    }

    #[tokio::test]
    async fn unsupported_platform_keeps_stored_permission() {
        let mut platform = FakePlatform::new(PermissionState::Denied);
        platform.supported = false;
        let dispatcher = dispatcher_for(platform);
        let mut config = Config::default();

        let result = request_and_record_permission(&dispatcher, &mut config).await;

        assert!(matches!(result, Err(DispatchError::Unsupported)));
        assert_eq!(config.notification_permission, PermissionState::Default);
    }

    #[tokio::test]
    async fn answered_prompt_is_stored() {
        let mut platform = FakePlatform::new(PermissionState::Default);
        platform.prompt_answer = PermissionState::Denied;
        let dispatcher = dispatcher_for(platform);
        let mut config = Config::default();

        let result = request_and_record_permission(&dispatcher, &mut config).await;
        assert!(matches!(result, Err(DispatchError::PermissionDenied)));
        assert_eq!(config.notification_permission, PermissionState::Denied);

        let dispatcher = dispatcher_for(FakePlatform::new(PermissionState::Default));
        let mut config = Config::default();
        request_and_record_permission(&dispatcher, &mut config)
            .await
            .expect("granted");
        assert_eq!(config.notification_permission, PermissionState::Granted);
    }

    #[test]
    fn reminder_time_accepts_rfc3339() {
        let parsed = parse_reminder_time("2024-01-01T09:00:00Z").expect("parsed");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn reminder_time_accepts_local_minutes() {
        assert!(parse_reminder_time("2024-01-01 09:00").is_ok());
        assert!(parse_reminder_time("tomorrow morning").is_err());
    }

    #[test]
    fn due_date_requires_iso_format() {
        assert!(parse_date("2024-01-31").is_ok());
        assert!(parse_date("31/01/2024").is_err());
    }
}
