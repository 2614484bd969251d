use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{EventsQuery, LoginHistoryQuery},
    repo_types::{LoginAttempt, LoginStats, SecurityEvent, SecurityEventStats},
    services,
};
use crate::{
    admin::capability::{Authorize, Capability},
    auth::extractors::AdminSession,
    error::AppResult,
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/security/events", get(list_events))
        .route("/admin/security/events/stats", get(event_stats))
        .route("/admin/security/login-history", get(login_history))
        .route("/admin/security/login-history/stats", get(login_stats))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list_events(
    State(state): State<AppState>,
    session: AdminSession,
    Query(q): Query<EventsQuery>,
) -> AppResult<Json<Vec<SecurityEvent>>> {
    session.require(Capability::ViewSecurity)?;
    let events = services::list_events(&state, q.event_type, q.severity, q.admin_id, q.limit).await?;
    Ok(Json(events))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn event_stats(
    State(state): State<AppState>,
    session: AdminSession,
) -> AppResult<Json<SecurityEventStats>> {
    session.require(Capability::ViewSecurity)?;
    Ok(Json(services::event_stats(&state).await?))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn login_history(
    State(state): State<AppState>,
    session: AdminSession,
    Query(q): Query<LoginHistoryQuery>,
) -> AppResult<Json<Vec<LoginAttempt>>> {
    session.require(Capability::ViewSecurity)?;
    Ok(Json(services::login_history(&state, q.status, q.username, q.limit).await?))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn login_stats(
    State(state): State<AppState>,
    session: AdminSession,
) -> AppResult<Json<LoginStats>> {
    session.require(Capability::ViewSecurity)?;
    Ok(Json(services::login_stats(&state).await?))
}
