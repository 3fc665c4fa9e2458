use crate::config::Config;
use crate::db::{Reminder, ReminderStatus};
use crate::notify::banner::{Banner, BannerBoard};
use crate::notify::log::{NewNotification, NotificationRecord, NotificationSnapshot, SharedNotificationLog};
use crate::notify::{NotificationDispatcher, PermissionState, Severity};
use crate::poller::{CycleReport, ReminderPoller};
use crate::store::{ReminderStore, SqliteStore, TaskStore};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<Config>,
    pub store: SqliteStore,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub banners: Arc<BannerBoard>,
    pub log: SharedNotificationLog,
    pub poller: Arc<ReminderPoller>,
    pub focused_task: Arc<Mutex<Option<i64>>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status))
        .route(
            "/api/v1/notifications",
            get(notifications_list).post(notifications_add),
        )
        .route("/api/v1/notifications/read-all", post(notifications_read_all))
        .route("/api/v1/notifications/trim", post(notifications_trim))
        .route("/api/v1/notifications/:id/read", post(notifications_read))
        .route("/api/v1/notifications/:id", delete(notifications_remove))
        .route("/api/v1/banners", get(banners_list))
        .route("/api/v1/banners/:id", delete(banners_dismiss))
        .route("/api/v1/tasks/:id/open", get(task_open))
        .route(
            "/api/v1/tasks/:id/reminders",
            get(task_reminders).post(task_reminder_create),
        )
        .route("/api/v1/reminders/poll", post(reminders_poll))
        .route("/api/v1/reminders/:id", delete(reminder_delete))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusPayload {
    permission: PermissionState,
    native_supported: bool,
    can_request_permission: bool,
    poller_running: bool,
    unread_notifications: usize,
    scheduled_reminders: i64,
    sent_reminders: i64,
    focused_task: Option<i64>,
    api_port: u16,
}

#[derive(Debug, Deserialize)]
struct CreateReminderPayload {
    scheduled_at: DateTime<Utc>,
}

async fn status(State(state): State<ApiState>) -> ApiResult<Json<StatusPayload>> {
    let focused_task = *state
        .focused_task
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    Ok(Json(StatusPayload {
        permission: state.dispatcher.permission(),
        native_supported: state.dispatcher.is_supported(),
        can_request_permission: state.dispatcher.can_request_permission(),
        poller_running: state.poller.is_running(),
        unread_notifications: state.log.unread_count(),
        scheduled_reminders: state.store.count_reminders(ReminderStatus::Scheduled)?,
        sent_reminders: state.store.count_reminders(ReminderStatus::Sent)?,
        focused_task,
        api_port: state.config.api_port,
    }))
}

async fn notifications_list(State(state): State<ApiState>) -> Json<NotificationSnapshot> {
    Json(state.log.snapshot())
}

async fn notifications_add(
    State(state): State<ApiState>,
    Json(payload): Json<NewNotification>,
) -> ApiResult<Json<NotificationRecord>> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Notification title must not be empty".to_string(),
        ));
    }

    Ok(Json(state.log.add(payload)))
}

async fn notifications_read(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Json<Value> {
    let updated = state.log.mark_read(id);

    Json(json!({
        "updated": updated,
        "unread_count": state.log.unread_count()
    }))
}

async fn notifications_read_all(State(state): State<ApiState>) -> Json<Value> {
    state.log.mark_all_read();

    Json(json!({ "unread_count": 0 }))
}

async fn notifications_trim(State(state): State<ApiState>) -> Json<Value> {
    let dropped = state.log.trim();

    Json(json!({
        "dropped": dropped,
        "unread_count": state.log.unread_count()
    }))
}

async fn notifications_remove(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Json<Value> {
    let removed = state.log.remove(id).is_some();

    Json(json!({
        "removed": removed,
        "unread_count": state.log.unread_count()
    }))
}

async fn banners_list(State(state): State<ApiState>) -> Json<Vec<Banner>> {
    Json(state.banners.list())
}

async fn banners_dismiss(State(state): State<ApiState>, Path(id): Path<u64>) -> Json<Value> {
    Json(json!({ "dismissed": state.dispatcher.dismiss_in_app(id) }))
}

async fn task_open(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<Value> {
    state.dispatcher.handle_click(id);

    Json(json!({ "navigated": true, "task_id": id }))
}

async fn task_reminders(
    State(state): State<ApiState>,
    Path(task_id): Path<i64>,
) -> ApiResult<Json<Vec<Reminder>>> {
    let reminders = state.store.list_by_task(task_id).await?;
    Ok(Json(reminders))
}

async fn task_reminder_create(
    State(state): State<ApiState>,
    Path(task_id): Path<i64>,
    Json(payload): Json<CreateReminderPayload>,
) -> ApiResult<Json<Reminder>> {
    let task = match state.store.get_by_id(task_id).await {
        Ok(task) => task,
        Err(error) => return Err(report_failure(&state, "Failed to add reminder", error)),
    };

    let Some(task) = task else {
        return Err(ApiError::NotFound(format!("Task not found: {task_id}")));
    };

    match ReminderStore::create(&state.store, task.id, payload.scheduled_at).await {
        Ok(reminder) => {
            info!(reminder_id = reminder.id, task_id, "reminder created");
            state.dispatcher.show_in_app_notification(
                "Reminder added",
                &format!("{} at {}", task.title, reminder.scheduled_at.format("%Y-%m-%d %H:%M")),
                Severity::Success,
                state.config.banner_duration_ms,
            );
            Ok(Json(reminder))
        }
        Err(error) => Err(report_failure(&state, "Failed to add reminder", error)),
    }
}

async fn reminder_delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    match state.store.delete(id).await {
        Ok(true) => {
            state.dispatcher.show_in_app_notification(
                "Reminder deleted",
                &format!("Reminder {id} removed"),
                Severity::Success,
                state.config.banner_duration_ms,
            );
            Ok(Json(json!({ "deleted": true })))
        }
        Ok(false) => Err(ApiError::NotFound(format!("Reminder not found: {id}"))),
        Err(error) => Err(report_failure(&state, "Failed to delete reminder", error)),
    }
}

async fn reminders_poll(State(state): State<ApiState>) -> ApiResult<Json<CycleReport>> {
    state
        .poller
        .run_cycle()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Conflict("A reminder cycle is already running".to_string()))
}

fn report_failure(state: &ApiState, title: &str, error: anyhow::Error) -> ApiError {
    warn!(error = %error, "{title}");
    state.dispatcher.show_in_app_notification(
        title,
        &error.to_string(),
        Severity::Error,
        state.config.banner_duration_ms,
    );

    ApiError::Internal(error)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Internal(error) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response(),
        }
    }
}
