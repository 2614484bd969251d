use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateRuleRequest, UpdateRuleRequest},
    repo_types::CoinRule,
    services::{self, RuleCatalog},
};
use crate::{
    admin::capability::{Authorize, Capability},
    auth::extractors::AdminSession,
    error::AppResult,
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/coins/rules", get(list_rules).post(create_rule))
        .route(
            "/admin/coins/rules/:id",
            put(update_rule).delete(delete_rule),
        )
        .route("/admin/coins/rules/:id/toggle", patch(toggle_rule))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list_rules(
    State(state): State<AppState>,
    session: AdminSession,
) -> AppResult<Json<RuleCatalog>> {
    session.require(Capability::ViewLedger)?;
    Ok(Json(services::list_rules(&state).await?))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn create_rule(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<CreateRuleRequest>,
) -> AppResult<(StatusCode, Json<CoinRule>)> {
    session.require(Capability::ManageRules)?;
    let rule = services::create_rule(&state, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn update_rule(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRuleRequest>,
) -> AppResult<Json<CoinRule>> {
    session.require(Capability::ManageRules)?;
    Ok(Json(services::update_rule(&state, id, payload.into()).await?))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn delete_rule(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    session.require(Capability::ManageRules)?;
    services::delete_rule(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn toggle_rule(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CoinRule>> {
    session.require(Capability::ManageRules)?;
    Ok(Json(services::toggle_rule(&state, id).await?))
}
