use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    capability::{Authorize, Capability},
    dto::{AdminMe, CreateAdminRequest, CreateRoleRequest, UpdateAdminRequest, UpdateRoleRequest},
    repo_types::{AdminUser, NewRole, Role, RolePatch},
    services::{self, CreateAdmin, UpdateAdmin},
};
use crate::{auth::extractors::AdminSession, error::AppResult, state::AppState};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/me", get(me))
        .route("/admin/roles", get(list_roles).post(create_role))
        .route("/admin/roles/:id", put(update_role).delete(delete_role))
        .route("/admin/admins", get(list_admins).post(create_admin))
        .route("/admin/admins/:id", put(update_admin))
}

#[instrument(skip(session), fields(admin_id = %session.admin_id))]
pub async fn me(session: AdminSession) -> Json<AdminMe> {
    Json(AdminMe {
        id: session.admin_id,
        username: session.username,
        role_name: session.role_name,
        capabilities: session.capabilities,
    })
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list_roles(
    State(state): State<AppState>,
    session: AdminSession,
) -> AppResult<Json<Vec<Role>>> {
    session.require(Capability::ManageAdmins)?;
    Ok(Json(services::list_roles(&state).await?))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn create_role(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    session.require(Capability::ManageAdmins)?;
    let role = services::create_role(
        &state,
        NewRole {
            role_name: payload.role_name,
            description: payload.description,
            capabilities: payload.capabilities,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn update_role(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<Role>> {
    session.require(Capability::ManageAdmins)?;
    let patch = RolePatch {
        role_name: payload.role_name,
        description: payload.description,
        capabilities: payload.capabilities,
    };
    Ok(Json(services::update_role(&state, id, patch).await?))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn delete_role(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    session.require(Capability::ManageAdmins)?;
    services::delete_role(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list_admins(
    State(state): State<AppState>,
    session: AdminSession,
) -> AppResult<Json<Vec<AdminUser>>> {
    session.require(Capability::ManageAdmins)?;
    Ok(Json(services::list_admins(&state).await?))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id, username = %payload.username))]
pub async fn create_admin(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<CreateAdminRequest>,
) -> AppResult<(StatusCode, Json<AdminUser>)> {
    session.require(Capability::ManageAdmins)?;
    let admin = services::create_admin(
        &state,
        CreateAdmin {
            username: payload.username,
            password: payload.password,
            name: payload.name,
            email: payload.email,
            role_id: payload.role_id,
            is_active: payload.is_active,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(admin)))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn update_admin(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAdminRequest>,
) -> AppResult<Json<AdminUser>> {
    session.require(Capability::ManageAdmins)?;
    let input = UpdateAdmin {
        name: payload.name,
        email: payload.email,
        role_id: payload.role_id,
        is_active: payload.is_active,
        password: payload.password,
    };
    Ok(Json(services::update_admin(&state, id, input).await?))
}
