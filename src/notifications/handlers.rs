use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{InboxQuery, SendNotificationRequest, UnreadCountResponse},
    repo_types::{NewNotification, Notification},
    services,
};
use crate::{
    admin::capability::{Authorize, Capability},
    auth::extractors::{AdminSession, AuthUser},
    error::AppResult,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me/notifications", get(inbox))
        .route("/me/notifications/unread-count", get(unread_count))
        .route("/me/notifications/:id", get(get_notification))
        .route("/me/notifications/:id/read", patch(mark_read))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/notifications", post(send))
}

#[instrument(skip(state))]
pub async fn inbox(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<InboxQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(services::inbox(&state, user_id, q.limit).await?))
}

#[instrument(skip(state))]
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UnreadCountResponse>> {
    let unread_count = services::unread_count(&state, user_id).await?;
    Ok(Json(UnreadCountResponse {
        user_id,
        unread_count,
    }))
}

#[instrument(skip(state))]
pub async fn get_notification(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    Ok(Json(services::get(&state, user_id, id).await?))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    Ok(Json(services::mark_read(&state, user_id, id).await?))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn send(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<SendNotificationRequest>,
) -> AppResult<(StatusCode, Json<Notification>)> {
    session.require(Capability::SendNotifications)?;
    let new = NewNotification {
        user_id: payload.user_id,
        title: payload.title,
        message: payload.message,
        notification_type: payload.notification_type,
        extra_data: payload.extra_data,
    };
    let notification = services::send(&state, new).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
