use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    ledger::repo_types::LedgerEntry,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Referral {
    pub id: Uuid,
    pub code: String,
    pub user_id: Option<Uuid>,    // owner; None for campaign codes
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Referral {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn ensure_redeemable(&self, now: OffsetDateTime) -> AppResult<()> {
        if !self.is_active {
            return Err(AppError::validation("referral code is no longer active"));
        }
        if self.is_expired(now) {
            return Err(AppError::validation("referral code has expired"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub code: String,
    pub user_id: Option<Uuid>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Input of the atomic redemption step. The store re-checks the code under
/// its lock and drops `referrer_reward` when the owner is no longer live.
#[derive(Debug, Clone)]
pub struct RedemptionRequest {
    pub referral_id: Uuid,
    pub user_id: Uuid,
    pub referee_reward: Option<LedgerEntry>,
    pub referrer_reward: Option<LedgerEntry>,
    pub now: OffsetDateTime,
}

impl RedemptionRequest {
    pub fn rewards(&self, referrer_live: bool) -> Vec<LedgerEntry> {
        let referrer = self.referrer_reward.iter().filter(|_| referrer_live);
        self.referee_reward.iter().chain(referrer).cloned().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Redemption {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferralListItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub referral: Referral,
    pub redemptions: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow, PartialEq, Eq)]
pub struct ReferralStats {
    pub total_codes: i64,
    pub active_codes: i64,
    pub expired_codes: i64,
    pub total_redemptions: i64,
}
