pub mod client;
pub mod routes;

use anyhow::{Context, Result};
use axum::Router;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpListener;
use tracing::info;

pub async fn run_server(state: routes::ApiState) -> Result<()> {
    let port = state.config.api_port;
    let app: Router = routes::router(state);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server: {addr}"))?;

    info!(address = %addr, "taskpulse API server started");

    axum::serve(listener, app)
        .await
        .context("API server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::client::request_cycle;
    use super::routes::{ApiState, router};
    use crate::config::Config;
    use crate::db::ReminderStatus;
    use crate::notify::banner::BannerBoard;
    use crate::notify::log::{NotificationKind, SharedNotificationLog};
    use crate::notify::testing::FakePlatform;
    use crate::notify::{NotificationDispatcher, PermissionState};
    use crate::poller::ReminderPoller;
    use crate::store::{ReminderStore, SqliteStore, TaskStore};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn service_state(store: SqliteStore) -> ApiState {
        let banners = Arc::new(BannerBoard::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(FakePlatform::new(PermissionState::Granted)),
            banners.clone(),
            5000,
        ));
        dispatcher.init();

        let log = SharedNotificationLog::default();
        let store_handle = Arc::new(store.clone());
        let poller = Arc::new(ReminderPoller::new(
            store_handle.clone(),
            store_handle,
            Arc::clone(&dispatcher),
            log.clone(),
            Duration::from_secs(60),
        ));

        ApiState {
            config: Arc::new(Config::default()),
            store,
            dispatcher,
            banners,
            log,
            poller,
            focused_task: Arc::new(Mutex::new(None)),
        }
    }

    async fn store_with_due_reminder(dir: &tempfile::TempDir) -> (SqliteStore, i64, i64) {
        let store = SqliteStore::open(&dir.path().join("api.db")).expect("store opened");
        let task = TaskStore::create(&store, "Renew passport", None)
            .await
            .expect("task created");
        let reminder =
            ReminderStore::create(&store, task.id, Utc::now() - ChronoDuration::minutes(5))
                .await
                .expect("reminder created");
        (store, task.id, reminder.id)
    }

    #[tokio::test]
    async fn cli_poll_records_delivery_in_the_service_log() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (store, task_id, reminder_id) = store_with_due_reminder(&dir).await;
        let state = service_state(store.clone());
        let log = state.log.clone();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener bound");
        let addr = listener.local_addr().expect("local addr");
        let server = tokio::spawn(async move { axum::serve(listener, router(state)).await });

        let report = request_cycle(&format!("http://{addr}"))
            .await
            .expect("cycle requested");
        assert_eq!(report.delivered, 1);

        let reminders = store.list_by_task(task_id).await.expect("reminders listed");
        assert_eq!(reminders[0].status, ReminderStatus::Sent);

        let snapshot = log.snapshot();
        assert_eq!(snapshot.notifications.len(), 1);
        assert_eq!(snapshot.notifications[0].kind, NotificationKind::Reminder);
        assert_eq!(snapshot.notifications[0].reminder_id, Some(reminder_id));

        server.abort();
    }

    #[tokio::test]
    async fn cli_poll_without_service_leaves_reminders_scheduled() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (store, _, _) = store_with_due_reminder(&dir).await;

        let port = {
            let reserved = std::net::TcpListener::bind("127.0.0.1:0").expect("port reserved");
            reserved.local_addr().expect("local addr").port()
        };

        let error = request_cycle(&format!("http://127.0.0.1:{port}"))
            .await
            .expect_err("no service listening");
        assert!(error.to_string().contains("not running"));

        let due = store.list_due(Utc::now()).await.expect("due listed");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].status, ReminderStatus::Scheduled);
    }
}
