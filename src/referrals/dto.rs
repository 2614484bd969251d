use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Redemption, ReferralListItem};
use crate::ledger::repo_types::CoinTransaction;

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub redemption: Redemption,
    pub transactions: Vec<CoinTransaction>,
    pub coins_awarded: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct IssueReferralRequest {
    pub user_id: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReferralList {
    pub referrals: Vec<ReferralListItem>,
    pub count: usize,
}
