use tracing::info;
use uuid::Uuid;

use super::repo_types::{NewNotification, Notification};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub const DEFAULT_INBOX_LIMIT: i64 = 50;
pub const MAX_INBOX_LIMIT: i64 = 200;
const MAX_TITLE_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 2000;

fn required(field: &str, value: String, max: usize) -> AppResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() || value.chars().count() > max {
        return Err(AppError::validation(format!("{field} must be 1 to {max} characters")));
    }
    Ok(value)
}

/// Queues a message in a live user's inbox.
pub async fn send(state: &AppState, new: NewNotification) -> AppResult<Notification> {
    state
        .store
        .get_user(new.user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let new = NewNotification {
        title: required("title", new.title, MAX_TITLE_LEN)?,
        message: required("message", new.message, MAX_MESSAGE_LEN)?,
        notification_type: required("notification_type", new.notification_type, 50)?,
        ..new
    };
    let notification = state.store.insert_notification(new).await?;
    info!(
        user_id = %notification.user_id,
        notification_id = %notification.id,
        kind = %notification.notification_type,
        "notification sent"
    );
    Ok(notification)
}

pub async fn inbox(state: &AppState, user_id: Uuid, limit: Option<i64>) -> AppResult<Vec<Notification>> {
    state
        .store
        .get_user(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let limit = limit.unwrap_or(DEFAULT_INBOX_LIMIT).clamp(1, MAX_INBOX_LIMIT);
    state.store.list_notifications(user_id, limit).await
}

/// Another user's notification is reported as missing.
pub async fn get(state: &AppState, user_id: Uuid, id: Uuid) -> AppResult<Notification> {
    state
        .store
        .get_notification(id, user_id)
        .await?
        .ok_or(AppError::NotFound("notification"))
}

pub async fn mark_read(state: &AppState, user_id: Uuid, id: Uuid) -> AppResult<Notification> {
    state
        .store
        .mark_notification_read(id, user_id)
        .await?
        .ok_or(AppError::NotFound("notification"))
}

pub async fn unread_count(state: &AppState, user_id: Uuid) -> AppResult<i64> {
    state.store.unread_count(user_id).await
}
