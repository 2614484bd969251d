use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{IssueReferralRequest, Pagination, RedeemRequest, RedeemResponse, ReferralList},
    repo_types::{Referral, ReferralStats},
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
        .route("/me/referral-code", get(my_code))
        .route("/me/referrals/redeem", post(redeem))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/referrals", get(list).post(issue))
        .route("/admin/referrals/stats", get(stats))
        .route("/admin/referrals/:id/deactivate", patch(deactivate))
}

#[instrument(skip(state))]
pub async fn my_code(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<Referral>> {
    Ok(Json(services::my_code(&state, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn redeem(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RedeemRequest>,
) -> AppResult<Json<RedeemResponse>> {
    let outcome = services::redeem(&state, &payload.code, user_id).await?;
    let coins_awarded = outcome
        .transactions
        .iter()
        .filter(|t| t.user_id == user_id)
        .map(|t| t.amount)
        .sum();
    Ok(Json(RedeemResponse {
        redemption: outcome.redemption,
        transactions: outcome.transactions,
        coins_awarded,
    }))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list(
    State(state): State<AppState>,
    session: AdminSession,
    Query(p): Query<Pagination>,
) -> AppResult<Json<ReferralList>> {
    session.require(Capability::ViewReferrals)?;
    let referrals = services::list(&state, p.limit, p.offset).await?;
    Ok(Json(ReferralList {
        count: referrals.len(),
        referrals,
    }))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id))]
pub async fn issue(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<IssueReferralRequest>,
) -> AppResult<(StatusCode, Json<Referral>)> {
    session.require(Capability::ManageReferrals)?;
    let referral = services::issue(&state, payload.user_id, payload.expires_at).await?;
    Ok((StatusCode::CREATED, Json(referral)))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn stats(
    State(state): State<AppState>,
    session: AdminSession,
) -> AppResult<Json<ReferralStats>> {
    session.require(Capability::ViewReferrals)?;
    Ok(Json(services::stats(&state).await?))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn deactivate(
    State(state): State<AppState>,
    session: AdminSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Referral>> {
    session.require(Capability::ManageReferrals)?;
    Ok(Json(services::deactivate(&state, id).await?))
}
