pub mod banner;
pub mod log;
pub mod platform;

use crate::db::{Reminder, Task};
use crate::notify::banner::{Banner, MessagePresenter};
use crate::notify::platform::NotificationPlatform;
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionState {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "default" => Ok(PermissionState::Default),
            "granted" => Ok(PermissionState::Granted),
            "denied" => Ok(PermissionState::Denied),
            other => Err(anyhow!(
                "Invalid permission state: {other}. Expected default|granted|denied"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Application-level events raised by notification interactions.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum AppEvent {
    NavigateToTask(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeNotification {
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    pub title: String,
    pub body: String,
    pub task_id: i64,
    pub reminder_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryChannel {
    Native,
    InApp(u64),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Notification permission denied")]
    PermissionDenied,
    #[error("Native notifications are not supported on this platform")]
    Unsupported,
    #[error("Notification platform error: {0}")]
    Platform(#[from] anyhow::Error),
}

pub struct NotificationDispatcher {
    platform: Arc<dyn NotificationPlatform>,
    presenter: Arc<dyn MessagePresenter>,
    permission: Mutex<PermissionState>,
    disposed: AtomicBool,
    next_banner_id: AtomicU64,
    banner_duration_ms: i64,
    events: broadcast::Sender<AppEvent>,
}

impl NotificationDispatcher {
    pub fn new(
        platform: Arc<dyn NotificationPlatform>,
        presenter: Arc<dyn MessagePresenter>,
        banner_duration_ms: i64,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            platform,
            presenter,
            permission: Mutex::new(PermissionState::Default),
            disposed: AtomicBool::new(false),
            next_banner_id: AtomicU64::new(1),
            banner_duration_ms,
            events,
        }
    }

    pub fn init(&self) -> PermissionState {
        let state = self.platform.query_permission();
        self.set_permission(state);
        self.disposed.store(false, Ordering::SeqCst);

        info!(
            permission = %state,
            supported = self.platform.is_supported(),
            "notification dispatcher initialized"
        );
        state
    }

    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            info!("notification dispatcher disposed");
        }
    }

    pub fn permission(&self) -> PermissionState {
        *self
            .permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_permission(&self, state: PermissionState) {
        *self
            .permission
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    pub fn is_permission_granted(&self) -> bool {
        self.permission() == PermissionState::Granted
    }

    pub fn can_request_permission(&self) -> bool {
        self.permission() == PermissionState::Default
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    pub async fn request_permission(&self) -> Result<(), DispatchError> {
        if !self.platform.is_supported() {
            return Err(DispatchError::Unsupported);
        }

        match self.permission() {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => Err(DispatchError::PermissionDenied),
            PermissionState::Default => {
                let outcome = self.platform.prompt_permission().await?;
                self.set_permission(outcome);
                info!(permission = %outcome, "notification permission prompt answered");

                if outcome == PermissionState::Granted {
                    Ok(())
                } else {
                    Err(DispatchError::PermissionDenied)
                }
            }
        }
    }

    /// Shows a native notification for the task. Returns `None` when native
    /// delivery is not permitted; callers pick the in-app path themselves.
    pub fn show_task_reminder(
        &self,
        task: &Task,
        reminder: &Reminder,
    ) -> Result<Option<NativeNotification>, DispatchError> {
        if self.disposed.load(Ordering::SeqCst) {
            debug!(task_id = task.id, "dispatcher disposed; native reminder dropped");
            return Ok(None);
        }

        if !self.is_permission_granted() {
            debug!(task_id = task.id, "notification permission not granted");
            return Ok(None);
        }

        let notification = NativeNotification {
            tag: task_tag(task.id),
            title: task.title.clone(),
            body: format!("Due: {}", describe_due_date(task.due_date)),
            task_id: task.id,
            reminder_id: reminder.id,
        };

        self.platform.show(&notification)?;
        Ok(Some(notification))
    }

    pub fn show_in_app_notification(
        &self,
        title: &str,
        message: &str,
        severity: Severity,
        duration_ms: i64,
    ) -> u64 {
        let banner = Banner {
            id: self.next_banner_id.fetch_add(1, Ordering::SeqCst),
            title: title.to_string(),
            message: message.to_string(),
            severity,
            shown_at: Utc::now(),
            duration_ms,
        };
        let id = banner.id;

        self.presenter.present(banner);

        if duration_ms > 0 {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let presenter = Arc::clone(&self.presenter);
                    let delay = Duration::from_millis(duration_ms.unsigned_abs());
                    handle.spawn(async move {
                        sleep(delay).await;
                        presenter.dismiss(id);
                    });
                }
                Err(_) => {
                    warn!(banner_id = id, "no async runtime; banner will not auto-dismiss");
                }
            }
        }

        id
    }

    pub fn dismiss_in_app(&self, id: u64) -> bool {
        self.presenter.dismiss(id)
    }

    /// Native when permitted, otherwise an in-app banner with the default duration.
    pub fn notify_reminder(
        &self,
        task: &Task,
        reminder: &Reminder,
    ) -> Result<DeliveryChannel, DispatchError> {
        if self.show_task_reminder(task, reminder)?.is_some() {
            return Ok(DeliveryChannel::Native);
        }

        let banner_id = self.show_in_app_notification(
            &task.title,
            &format!("Reminder: Due {}", describe_due_date(task.due_date)),
            Severity::Info,
            self.banner_duration_ms,
        );
        Ok(DeliveryChannel::InApp(banner_id))
    }

    /// Click handler for a native task notification.
    pub fn handle_click(&self, task_id: i64) {
        if self.events.send(AppEvent::NavigateToTask(task_id)).is_err() {
            debug!(task_id, "no navigation listeners");
        }

        if let Err(error) = self.platform.close(&task_tag(task_id)) {
            warn!(error = %error, task_id, "failed to close task notification");
        }
    }
}

pub fn task_tag(task_id: i64) -> String {
    format!("task-{task_id}")
}

pub fn describe_due_date(due_date: Option<NaiveDate>) -> String {
    due_date
        .map(|date| date.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| "no due date".to_string())
}


#[cfg(test)]
mod tests {
    use super::testing::FakePlatform;
    use super::*;
    use crate::db::ReminderStatus;
    use crate::notify::banner::BannerBoard;
    use chrono::TimeZone;

    fn dispatcher(platform: Arc<FakePlatform>) -> (NotificationDispatcher, Arc<BannerBoard>) {
        let board = Arc::new(BannerBoard::default());
        let dispatcher = NotificationDispatcher::new(platform, board.clone(), 5000);
        dispatcher.init();
        (dispatcher, board)
    }

    fn task() -> Task {
        Task {
            id: 7,
            title: "Pay rent".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            created_at: 0,
        }
    }

    fn reminder() -> Reminder {
        Reminder {
            id: 1,
            task_id: 7,
            scheduled_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            status: ReminderStatus::Scheduled,
        }
    }

    #[tokio::test]
    async fn granting_from_default_enables_native_reminders_without_reprompt() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Default));
        let (dispatcher, _) = dispatcher(platform.clone());

        dispatcher.request_permission().await.expect("granted");
        assert_eq!(dispatcher.permission(), PermissionState::Granted);

        dispatcher.request_permission().await.expect("still granted");
        assert_eq!(platform.prompt_count(), 1);

        let first = dispatcher
            .show_task_reminder(&task(), &reminder())
            .expect("shown");
        let second = dispatcher
            .show_task_reminder(&task(), &reminder())
            .expect("shown again");
        assert!(first.is_some() && second.is_some());
        assert_eq!(platform.prompt_count(), 1);

        let shown = platform.shown();
        assert_eq!(shown.len(), 2);
        assert!(shown.iter().all(|notification| notification.tag == "task-7"));
        assert_eq!(shown[0].body, "Due: Jan 1, 2024");
    }

    #[tokio::test]
    async fn denied_permission_fails_without_prompting() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Denied));
        let (dispatcher, _) = dispatcher(platform.clone());

        let result = dispatcher.request_permission().await;
        assert!(matches!(result, Err(DispatchError::PermissionDenied)));
        assert_eq!(dispatcher.permission(), PermissionState::Denied);
        assert_eq!(platform.prompt_count(), 0);
    }

    #[tokio::test]
    async fn rejected_prompt_moves_to_denied() {
        let mut platform = FakePlatform::new(PermissionState::Default);
        platform.prompt_answer = PermissionState::Denied;
        let (dispatcher, _) = dispatcher(Arc::new(platform));

        let result = dispatcher.request_permission().await;
        assert!(matches!(result, Err(DispatchError::PermissionDenied)));
        assert_eq!(dispatcher.permission(), PermissionState::Denied);
        assert!(!dispatcher.can_request_permission());
    }

    #[tokio::test]
    async fn dismissed_prompt_stays_default_and_can_ask_again() {
        let mut platform = FakePlatform::new(PermissionState::Default);
        platform.prompt_answer = PermissionState::Default;
        let platform = Arc::new(platform);
        let (dispatcher, _) = dispatcher(platform.clone());

        let result = dispatcher.request_permission().await;
        assert!(matches!(result, Err(DispatchError::PermissionDenied)));
        assert_eq!(dispatcher.permission(), PermissionState::Default);
        assert!(dispatcher.can_request_permission());

        let _ = dispatcher.request_permission().await;
        assert_eq!(platform.prompt_count(), 2);
    }

    #[tokio::test]
    async fn unsupported_platform_cannot_request_permission() {
        let mut platform = FakePlatform::new(PermissionState::Default);
        platform.supported = false;
        let (dispatcher, _) = dispatcher(Arc::new(platform));

        let result = dispatcher.request_permission().await;
        assert!(matches!(result, Err(DispatchError::Unsupported)));
    }

    #[tokio::test]
    async fn reminder_without_permission_falls_back_to_banner() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Default));
        let (dispatcher, board) = dispatcher(platform.clone());

        assert!(
            dispatcher
                .show_task_reminder(&task(), &reminder())
                .expect("no-op")
                .is_none()
        );

        let channel = dispatcher
            .notify_reminder(&task(), &reminder())
            .expect("delivered");
        assert!(matches!(channel, DeliveryChannel::InApp(_)));
        assert!(platform.shown().is_empty());

        let banners = board.list();
        assert_eq!(banners.len(), 1);
        assert_eq!(banners[0].title, "Pay rent");
        assert_eq!(banners[0].message, "Reminder: Due Jan 1, 2024");
    }

    #[tokio::test]
    async fn disposed_dispatcher_skips_native_delivery() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Granted));
        let (dispatcher, _) = dispatcher(platform.clone());

        dispatcher.dispose();
        dispatcher.dispose();

        let shown = dispatcher
            .show_task_reminder(&task(), &reminder())
            .expect("no-op");
        assert!(shown.is_none());
        assert!(platform.shown().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn banners_auto_dismiss_unless_duration_is_non_positive() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Default));
        let (dispatcher, board) = dispatcher(platform);

        let transient = dispatcher.show_in_app_notification("Saved", "ok", Severity::Success, 5000);
        let sticky = dispatcher.show_in_app_notification("Offline", "retry", Severity::Warning, 0);
        assert_eq!(board.list().len(), 2);

        sleep(Duration::from_millis(5001)).await;

        let remaining = board.list();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, sticky);
        assert!(!dispatcher.dismiss_in_app(transient));

        assert!(dispatcher.dismiss_in_app(sticky));
        assert!(board.list().is_empty());
    }

    #[tokio::test]
    async fn click_raises_navigation_and_closes_notification() {
        let platform = Arc::new(FakePlatform::new(PermissionState::Granted));
        let (dispatcher, _) = dispatcher(platform.clone());
        let mut events = dispatcher.subscribe();

        dispatcher.handle_click(7);

        assert_eq!(events.recv().await.expect("event"), AppEvent::NavigateToTask(7));
        assert_eq!(
            platform.closed.lock().expect("closed lock").as_slice(),
            ["task-7".to_string()]
        );
    }

    #[test]
    fn permission_state_parses_case_insensitively() {
        assert_eq!(
            "Granted".parse::<PermissionState>().expect("parsed"),
            PermissionState::Granted
        );
        assert!("maybe".parse::<PermissionState>().is_err());
    }
}
