use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, ListUsersQuery, UpdateMeRequest, UpdateUserRequest, UserList},
    repo_types::{User, UserPatch},
    services::{self, CreateUser},
};
use crate::{
    admin::capability::{Authorize, Capability},
    auth::extractors::{AdminSession, AuthUser},
    error::AppResult,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route(
            "/admin/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<User>> {
    Ok(Json(services::get_user(&state, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> AppResult<Json<User>> {
    let user = services::update_me(&state, user_id, payload.name, payload.email).await?;
    Ok(Json(user))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list_users(
    State(state): State<AppState>,
    session: AdminSession,
    Query(q): Query<ListUsersQuery>,
) -> AppResult<Json<UserList>> {
    session.require(Capability::ViewUsers)?;
    let users = services::list_users(&state, q.search, q.limit, q.offset).await?;
    Ok(Json(UserList {
        count: users.len(),
        users,
    }))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn create_user(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    session.require(Capability::ManageUsers)?;
    if payload.initial_coins != 0 {
        session.require(Capability::AdjustCoins)?;
    }
    let user = services::create_user(
        &state,
        session.admin_id,
        CreateUser {
            phone_number: payload.phone_number,
            name: payload.name,
            email: payload.email,
            initial_coins: payload.initial_coins,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn get_user(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    session.require(Capability::ViewUsers)?;
    Ok(Json(services::get_user(&state, id).await?))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn update_user(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    session.require(Capability::ManageUsers)?;
    let patch = UserPatch {
        phone_number: payload.phone_number,
        name: payload.name,
        email: payload.email,
    };
    Ok(Json(services::update_user(&state, id, patch).await?))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn delete_user(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    session.require(Capability::ManageUsers)?;
    services::delete_user(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
