use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{RecentQuery, RecordScanRequest, ScanResponse},
    repo_types::FoodScan,
    services::{self, ScanInput},
};
use crate::{auth::extractors::AuthUser, error::AppResult, state::AppState};

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me/scans", post(record_scan))
        .route("/me/scans/recent", get(recent_scans))
}

#[instrument(skip(state, payload), fields(food = %payload.food_name))]
pub async fn record_scan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RecordScanRequest>,
) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    let input = ScanInput {
        food_name: payload.food_name,
        confidence: payload.confidence,
        image_path: payload.image_path,
        nutrition: payload.nutrition,
    };
    let done = services::record_scan(&state, user_id, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ScanResponse {
            coins_earned: done.coins_earned(),
            total_coins: done.total_coins,
            scan: done.scan,
            transaction: done.transaction,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn recent_scans(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<RecentQuery>,
) -> AppResult<Json<Vec<FoodScan>>> {
    Ok(Json(services::recent_scans(&state, user_id, q.limit).await?))
}
