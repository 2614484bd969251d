use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    NewReferral, Redemption, RedemptionRequest, Referral, ReferralListItem, ReferralStats,
};
use crate::{
    error::{AppError, AppResult},
    ledger::{repo::post_entries_tx, repo_types::CoinTransaction},
    store::{PgStore, ReferralStore},
};

const REFERRAL_COLUMNS: &str = "id, code, user_id, expires_at, is_active, created_at";

#[async_trait]
impl ReferralStore for PgStore {
    async fn insert_referral(&self, new: NewReferral) -> AppResult<Referral> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            r#"
            INSERT INTO referrals (id, code, user_id, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {REFERRAL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.code)
        .bind(new.user_id)
        .bind(new.expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(referral)
    }

    async fn get_referral_by_code(&self, code: &str) -> AppResult<Option<Referral>> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.db)
        .await?;
        Ok(referral)
    }

    async fn active_referral_for_owner(&self, user_id: Uuid) -> AppResult<Option<Referral>> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            r#"
            SELECT {REFERRAL_COLUMNS}
              FROM referrals
             WHERE user_id = $1
               AND is_active
               AND (expires_at IS NULL OR expires_at > NOW())
             ORDER BY created_at DESC
             LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(referral)
    }

    async fn list_referrals(&self, limit: i64, offset: i64) -> AppResult<Vec<ReferralListItem>> {
        let items = sqlx::query_as::<_, ReferralListItem>(
            r#"
            SELECT r.id, r.code, r.user_id, r.expires_at, r.is_active, r.created_at,
                   COUNT(d.id) AS redemptions
              FROM referrals r
              LEFT JOIN referral_redemptions d ON d.referral_id = r.id
             GROUP BY r.id
             ORDER BY r.created_at DESC, r.id
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    async fn deactivate_referral(&self, id: Uuid) -> AppResult<Option<Referral>> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            "UPDATE referrals SET is_active = FALSE WHERE id = $1 RETURNING {REFERRAL_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(referral)
    }

    async fn referral_stats(&self, now: OffsetDateTime) -> AppResult<ReferralStats> {
        let stats = sqlx::query_as::<_, ReferralStats>(
            r#"
            SELECT COUNT(*) AS total_codes,
                   COUNT(*) FILTER (WHERE is_active AND (expires_at IS NULL OR expires_at > $1))
                       AS active_codes,
                   COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at <= $1)
                       AS expired_codes,
                   (SELECT COUNT(*) FROM referral_redemptions) AS total_redemptions
              FROM referrals
            "#,
        )
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(stats)
    }

    async fn redeem_referral(
        &self,
        request: &RedemptionRequest,
    ) -> AppResult<(Redemption, Vec<CoinTransaction>)> {
        let mut tx = self.db.begin().await?;

        // the code row first, then users in id order like every ledger posting
        let referral = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = $1 FOR UPDATE"
        ))
        .bind(request.referral_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("referral code"))?;
        referral.ensure_redeemable(request.now)?;

        let referrer_live = match &request.referrer_reward {
            Some(reward) => {
                let mut ids = vec![request.user_id, reward.user_id];
                ids.sort();
                ids.dedup();
                let live = sqlx::query_scalar::<_, Uuid>(
                    r#"
                    SELECT id
                      FROM users
                     WHERE id = ANY($1) AND deleted_at IS NULL
                     ORDER BY id
                       FOR UPDATE
                    "#,
                )
                .bind(&ids[..])
                .fetch_all(&mut *tx)
                .await?;
                live.contains(&reward.user_id)
            }
            None => false,
        };

        // unique(user_id) turns a second redemption into a Conflict
        let redemption = sqlx::query_as::<_, Redemption>(
            r#"
            INSERT INTO referral_redemptions (id, referral_id, user_id)
            VALUES ($1, $2, $3)
            RETURNING id, referral_id, user_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.referral_id)
        .bind(request.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let rewards = request.rewards(referrer_live);
        let posted = if rewards.is_empty() {
            Vec::new()
        } else {
            post_entries_tx(&mut tx, &rewards).await?
        };

        tx.commit().await?;
        Ok((redemption, posted))
    }
}
