use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AdjustRequest, ApplyRuleRequest, BalanceResponse, HistoryQuery, HistoryResponse,
        StatsQuery, TransferRequest, TransferResponse, UserCoinsResponse,
    },
    repo_types::{CoinTransaction, TransactionFilter, TransactionStats},
    services::Actor,
};
use crate::{
    admin::capability::{Authorize, Capability},
    auth::extractors::{AdminSession, AuthUser},
    error::AppResult,
    state::AppState,
};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me/coins", get(my_balance))
        .route("/me/coins/history", get(my_history))
        .route("/me/coins/transfer", post(transfer))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users/:id/coins", get(user_coins))
        .route("/admin/coins/adjust", post(adjust))
        .route("/admin/coins/apply-rule", post(apply_rule))
        .route("/admin/coins/transactions", get(list_transactions))
        .route("/admin/coins/transactions/stats", get(stats))
}

#[instrument(skip(state))]
pub async fn my_balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<BalanceResponse>> {
    let coins = state.ledger.balance(user_id).await?;
    Ok(Json(BalanceResponse { user_id, coins }))
}

#[instrument(skip(state))]
pub async fn my_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<HistoryQuery>,
) -> AppResult<Json<HistoryResponse>> {
    // 404 for deleted accounts instead of an empty list
    state.ledger.balance(user_id).await?;
    let transactions = state.ledger.history(user_id, q.limit).await?;
    Ok(Json(HistoryResponse {
        count: transactions.len(),
        transactions,
    }))
}

#[instrument(skip(state, payload), fields(amount = payload.amount))]
pub async fn transfer(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<TransferRequest>,
) -> AppResult<Json<TransferResponse>> {
    let done = state
        .ledger
        .transfer(user_id, &payload.receiver_phone, payload.amount)
        .await?;
    Ok(Json(TransferResponse {
        new_balance: done.debit.balance_after,
        debit: done.debit,
        credit: done.credit,
    }))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn user_coins(
    State(state): State<AppState>,
    session: AdminSession,
    Path(user_id): Path<Uuid>,
    Query(q): Query<HistoryQuery>,
) -> AppResult<Json<UserCoinsResponse>> {
    session.require(Capability::ViewLedger)?;
    let coins = state.ledger.balance(user_id).await?;
    let transactions = state.ledger.history(user_id, q.limit).await?;
    Ok(Json(UserCoinsResponse {
        user_id,
        coins,
        transactions,
    }))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id, user_id = %payload.user_id))]
pub async fn adjust(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<AdjustRequest>,
) -> AppResult<(StatusCode, Json<CoinTransaction>)> {
    session.require(Capability::AdjustCoins)?;
    let amount = payload.signed_amount()?;
    let tx = state
        .ledger
        .adjust(
            payload.user_id,
            amount,
            &payload.reason,
            Actor::Admin(session.admin_id),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[instrument(skip(state, session, payload), fields(admin_id = %session.admin_id, action = %payload.action_name))]
pub async fn apply_rule(
    State(state): State<AppState>,
    session: AdminSession,
    Json(payload): Json<ApplyRuleRequest>,
) -> AppResult<(StatusCode, Json<CoinTransaction>)> {
    session.require(Capability::AdjustCoins)?;
    let tx = state
        .ledger
        .apply_rule(payload.user_id, payload.action_name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn list_transactions(
    State(state): State<AppState>,
    session: AdminSession,
    Query(filter): Query<TransactionFilter>,
) -> AppResult<Json<HistoryResponse>> {
    session.require(Capability::ViewLedger)?;
    let transactions = state.ledger.transactions(filter).await?;
    Ok(Json(HistoryResponse {
        count: transactions.len(),
        transactions,
    }))
}

#[instrument(skip(state, session), fields(admin_id = %session.admin_id))]
pub async fn stats(
    State(state): State<AppState>,
    session: AdminSession,
    Query(q): Query<StatsQuery>,
) -> AppResult<Json<TransactionStats>> {
    session.require(Capability::ViewLedger)?;
    Ok(Json(state.ledger.stats(q.manual_only).await?))
}
