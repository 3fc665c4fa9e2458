use crate::notify::{NativeNotification, PermissionState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

#[cfg(target_os = "macos")]
use anyhow::bail;
#[cfg(target_os = "macos")]
use std::process::{Command, Stdio};

/// Native desktop alerting capability.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn is_supported(&self) -> bool;

    fn query_permission(&self) -> PermissionState;

    /// Asks the user. A dismissed prompt answers `Default`.
    async fn prompt_permission(&self) -> Result<PermissionState>;

    fn show(&self, notification: &NativeNotification) -> Result<()>;

    fn close(&self, tag: &str) -> Result<()>;
}

/// macOS notifications through `terminal-notifier`. Clicking a notification
/// opens the local API click route for its task.
pub struct TerminalNotifier {
    stored_permission: PermissionState,
    click_base: Url,
    supported: bool,
}

impl TerminalNotifier {
    pub fn new(stored_permission: PermissionState, api_base_url: &str) -> Result<Self> {
        let click_base = Url::parse(api_base_url)
            .with_context(|| format!("Invalid API base URL: {api_base_url}"))?;

        Ok(Self {
            stored_permission,
            click_base,
            supported: terminal_notifier_available(),
        })
    }

    pub fn click_url(&self, task_id: i64) -> Result<Url> {
        self.click_base
            .join(&format!("api/v1/tasks/{task_id}/open"))
            .context("Failed to build notification click URL")
    }
}

#[async_trait]
impl NotificationPlatform for TerminalNotifier {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn query_permission(&self) -> PermissionState {
        if self.supported {
            self.stored_permission
        } else {
            PermissionState::Denied
        }
    }

    async fn prompt_permission(&self) -> Result<PermissionState> {
        tokio::task::spawn_blocking(prompt_on_terminal)
            .await
            .context("Permission prompt task failed")?
    }

    #[cfg(target_os = "macos")]
    fn show(&self, notification: &NativeNotification) -> Result<()> {
        let click_url = self.click_url(notification.task_id)?;

        let status = Command::new("terminal-notifier")
            .args([
                "-title",
                &notification.title,
                "-message",
                &notification.body,
                "-group",
                &notification.tag,
                "-actions",
                "View Task",
                "-open",
                click_url.as_str(),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("Failed to execute terminal-notifier")?;

        if !status.success() {
            bail!("terminal-notifier exited with {status}");
        }

        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn show(&self, _notification: &NativeNotification) -> Result<()> {
        anyhow::bail!("native notifications are only supported on macOS")
    }

    #[cfg(target_os = "macos")]
    fn close(&self, tag: &str) -> Result<()> {
        Command::new("terminal-notifier")
            .args(["-remove", tag])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("Failed to execute terminal-notifier")?;

        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn close(&self, _tag: &str) -> Result<()> {
        Ok(())
    }
}

fn prompt_on_terminal() -> Result<PermissionState> {
    use dialoguer::{Confirm, theme::ColorfulTheme};
    use std::io::IsTerminal;

    if !std::io::stdin().is_terminal() {
        return Ok(PermissionState::Default);
    }

    let allowed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Allow taskpulse to show desktop notifications for reminders?")
        .default(true)
        .interact_opt()
        .context("Failed to read notification permission input")?;

    Ok(match allowed {
        Some(true) => PermissionState::Granted,
        Some(false) => PermissionState::Denied,
        None => PermissionState::Default,
    })
}

#[cfg(target_os = "macos")]
fn terminal_notifier_available() -> bool {
    Command::new("terminal-notifier")
        .arg("-help")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[cfg(not(target_os = "macos"))]
fn terminal_notifier_available() -> bool {
    false
}
