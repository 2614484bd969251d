use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        AdminAuthResponse, AdminLoginRequest, ChangePasswordRequest, RefreshRequest,
        SendOtpRequest, SendOtpResponse, TokenResponse, UserAuthResponse, VerifyOtpRequest,
    },
    extractors::AdminSession,
    services,
};
use crate::{error::AppResult, security::services::client_ip, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/otp/send", post(send_otp))
        .route("/auth/otp/verify", post(verify_otp))
        .route("/auth/refresh", post(refresh))
        .route("/admin/auth/login", post(admin_login))
        .route("/admin/auth/change-password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> AppResult<Json<SendOtpResponse>> {
    let issued = services::send_otp(&state, &payload.phone_number).await?;
    Ok(Json(SendOtpResponse {
        success: true,
        message: format!("OTP sent to {}", issued.phone_number),
        expires_at: issued.expires_at,
        otp_code: issued.code,
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Json<UserAuthResponse>> {
    let (user, tokens, is_new_user) =
        services::verify_otp(&state, &payload.phone_number, &payload.otp_code).await?;
    Ok(Json(UserAuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        is_new_user,
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let tokens = services::refresh(&state, &payload.refresh_token).await?;
    Ok(Json(TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[instrument(skip(state, payload), fields(username = %payload.username))]
pub async fn admin_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AdminLoginRequest>,
) -> AppResult<Json<AdminAuthResponse>> {
    let ip = client_ip(&headers);
    let (admin, tokens) =
        services::admin_login(&state, &payload.username, &payload.password, &ip).await?;
    Ok(Json(AdminAuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        admin,
    }))
}

#[instrument(skip(state, session, headers, payload), fields(admin_id = %session.admin_id))]
pub async fn change_password(
    State(state): State<AppState>,
    session: AdminSession,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    services::change_admin_password(
        &state,
        session.admin_id,
        &payload.current_password,
        &payload.new_password,
        &client_ip(&headers),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
