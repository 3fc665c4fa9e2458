use crate::db::{Reminder, ReminderStatus};
use crate::notify::log::{NewNotification, NotificationKind, SharedNotificationLog};
use crate::notify::{DeliveryChannel, NotificationDispatcher, describe_due_date};
use crate::store::{ReminderStore, TaskStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub due: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fetch_failed: bool,
}

enum Delivery {
    Delivered(DeliveryChannel),
    TaskMissing,
}

struct Runner {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives due reminders through dispatch, the notification log, and the
/// Sent transition.
pub struct ReminderPoller {
    reminders: Arc<dyn ReminderStore>,
    tasks: Arc<dyn TaskStore>,
    dispatcher: Arc<NotificationDispatcher>,
    log: SharedNotificationLog,
    period: Duration,
    in_flight: AtomicBool,
    runner: Mutex<Option<Runner>>,
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReminderPoller {
    pub fn new(
        reminders: Arc<dyn ReminderStore>,
        tasks: Arc<dyn TaskStore>,
        dispatcher: Arc<NotificationDispatcher>,
        log: SharedNotificationLog,
        period: Duration,
    ) -> Self {
        Self {
            reminders,
            tasks,
            dispatcher,
            log,
            period,
            in_flight: AtomicBool::new(false),
            runner: Mutex::new(None),
        }
    }

    /// Runs one cycle immediately, then one per period until `stop`.
    /// Returns false if the poller was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut runner = self.runner.lock().unwrap_or_else(PoisonError::into_inner);
        if runner
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
        {
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let poller = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poller.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                poll_seconds = poller.period.as_secs(),
                "reminder poller started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                if *stopped.borrow() {
                    break;
                }

                poller.run_cycle().await;
            }

            info!("reminder poller stopped");
        });

        *runner = Some(Runner { stop, handle });
        true
    }

    /// Prevents further cycles. A cycle already running finishes normally.
    pub fn stop(&self) {
        let runner = self
            .runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(runner) = runner {
            let _ = runner.stop.send(true);
        }
    }

    pub fn is_running(&self) -> bool {
        self.runner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    pub async fn run_cycle(&self) -> Option<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// `None` when another cycle is still in progress.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Option<CycleReport> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("previous reminder cycle still running; skipping");
            return None;
        }
        let _guard = CycleGuard(&self.in_flight);

        Some(self.process_due(now).await)
    }

    async fn process_due(&self, now: DateTime<Utc>) -> CycleReport {
        let due = match self.reminders.list_due(now).await {
            Ok(due) => due,
            Err(error) => {
                error!(error = %error, "failed to fetch due reminders");
                return CycleReport {
                    fetch_failed: true,
                    ..CycleReport::default()
                };
            }
        };

        let mut report = CycleReport {
            due: due.len(),
            ..CycleReport::default()
        };

        for reminder in &due {
            match self.deliver(reminder).await {
                Ok(Delivery::Delivered(channel)) => {
                    report.delivered += 1;
                    debug!(reminder_id = reminder.id, ?channel, "reminder delivered");
                }
                Ok(Delivery::TaskMissing) => report.skipped += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        error = %error,
                        reminder_id = reminder.id,
                        task_id = reminder.task_id,
                        "reminder delivery failed; retrying next cycle"
                    );
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                delivered = report.delivered,
                skipped = report.skipped,
                failed = report.failed,
                "reminder cycle finished"
            );
        }

        report
    }

    async fn deliver(&self, reminder: &Reminder) -> Result<Delivery> {
        let task = self
            .tasks
            .get_by_id(reminder.task_id)
            .await
            .with_context(|| format!("Failed to load task {}", reminder.task_id))?;

        let Some(task) = task else {
            debug!(
                reminder_id = reminder.id,
                task_id = reminder.task_id,
                "task not found for reminder; skipped"
            );
            return Ok(Delivery::TaskMissing);
        };

        let channel = self
            .dispatcher
            .notify_reminder(&task, reminder)
            .context("Failed to dispatch reminder")?;

        self.log.add(NewNotification {
            kind: NotificationKind::Reminder,
            title: task.title.clone(),
            message: format!("Due: {}", describe_due_date(task.due_date)),
            task_id: Some(task.id),
            reminder_id: Some(reminder.id),
        });

        self.reminders
            .update_status(reminder.id, ReminderStatus::Sent)
            .await
            .with_context(|| format!("Failed to mark reminder {} as sent", reminder.id))?;

        Ok(Delivery::Delivered(channel))
    }
}
