use rand::Rng;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::{
    NewReferral, Redemption, RedemptionRequest, Referral, ReferralListItem, ReferralStats,
};
use crate::{
    error::{AppError, AppResult},
    ledger::{
        repo_types::{CoinTransaction, LedgerEntry},
        services::{retry_concurrent, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT},
    },
    state::AppState,
};

/// Upper-case alphabet without 0/O and 1/I.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 8;
const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    pub redemption: Redemption,
    pub transactions: Vec<CoinTransaction>,
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

async fn insert_with_fresh_code(
    state: &AppState,
    user_id: Option<Uuid>,
    expires_at: Option<OffsetDateTime>,
) -> AppResult<Referral> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let new = NewReferral {
            code: generate_code(),
            user_id,
            expires_at,
        };
        match state.store.insert_referral(new).await {
            Err(AppError::Conflict(_)) if attempt < CODE_ATTEMPTS => {
                warn!(attempt, "referral code collision, regenerating");
            }
            other => return other,
        }
    }
}

/// The user's active code, created on first request.
pub async fn my_code(state: &AppState, user_id: Uuid) -> AppResult<Referral> {
    state
        .store
        .get_user(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    if let Some(existing) = state.store.active_referral_for_owner(user_id).await? {
        return Ok(existing);
    }
    let referral = insert_with_fresh_code(state, Some(user_id), None).await?;
    info!(%user_id, code = %referral.code, "referral code created");
    Ok(referral)
}

/// Admin-issued code, optionally owned by a user and optionally expiring.
pub async fn issue(
    state: &AppState,
    owner_id: Option<Uuid>,
    expires_at: Option<OffsetDateTime>,
) -> AppResult<Referral> {
    if let Some(owner) = owner_id {
        state
            .store
            .get_user(owner)
            .await?
            .ok_or(AppError::NotFound("user"))?;
    }
    if expires_at.is_some_and(|at| at <= OffsetDateTime::now_utc()) {
        return Err(AppError::validation("expires_at must be in the future"));
    }
    let referral = insert_with_fresh_code(state, owner_id, expires_at).await?;
    info!(code = %referral.code, owner = ?owner_id, "referral code issued");
    Ok(referral)
}

/// Records the redemption and credits both parties in one atomic step.
/// Activity, expiry and the owner's liveness are settled again inside that
/// step; the checks here only fail fast.
pub async fn redeem(state: &AppState, code: &str, user_id: Uuid) -> AppResult<RedeemOutcome> {
    let code = normalize_code(code);
    let referral = state
        .store
        .get_referral_by_code(&code)
        .await?
        .ok_or(AppError::NotFound("referral code"))?;

    referral.ensure_redeemable(OffsetDateTime::now_utc())?;
    if referral.user_id == Some(user_id) {
        return Err(AppError::Conflict("cannot redeem your own referral code".into()));
    }
    state
        .store
        .get_user(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let bonus = &state.config.referral;
    let referee_reward = (bonus.referee_bonus > 0).then(|| LedgerEntry {
        user_id,
        amount: bonus.referee_bonus,
        description: format!("Referral bonus for redeeming {code}"),
        admin_id: None,
    });
    // a deleted owner forfeits this one; the store decides
    let referrer_reward = referral
        .user_id
        .filter(|_| bonus.referrer_bonus > 0)
        .map(|owner| LedgerEntry {
            user_id: owner,
            amount: bonus.referrer_bonus,
            description: format!("Referral bonus, code {code} redeemed"),
            admin_id: None,
        });

    let store = state.store.clone();
    let referral_id = referral.id;
    let (redemption, transactions) = retry_concurrent(state.ledger.max_retries(), || {
        let store = store.clone();
        let request = RedemptionRequest {
            referral_id,
            user_id,
            referee_reward: referee_reward.clone(),
            referrer_reward: referrer_reward.clone(),
            now: OffsetDateTime::now_utc(),
        };
        async move { store.redeem_referral(&request).await }
    })
    .await?;

    info!(%user_id, %code, owner = ?referral.user_id, "referral code redeemed");
    Ok(RedeemOutcome {
        redemption,
        transactions,
    })
}

pub async fn list(
    state: &AppState,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<ReferralListItem>> {
    let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    state
        .store
        .list_referrals(limit, offset.unwrap_or(0).max(0))
        .await
}

pub async fn deactivate(state: &AppState, id: Uuid) -> AppResult<Referral> {
    let referral = state
        .store
        .deactivate_referral(id)
        .await?
        .ok_or(AppError::NotFound("referral"))?;
    info!(referral_id = %id, code = %referral.code, "referral code deactivated");
    Ok(referral)
}

pub async fn stats(state: &AppState) -> AppResult<ReferralStats> {
    state
        .store
        .referral_stats(OffsetDateTime::now_utc())
        .await
}
