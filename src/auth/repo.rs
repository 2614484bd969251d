use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::AppResult,
    store::{OtpStore, PgStore},
};

#[async_trait]
impl OtpStore for PgStore {
    async fn insert_otp(
        &self,
        phone_number: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO otp_verifications (id, phone_number, code, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone_number)
        .bind(code)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn consume_otp(
        &self,
        phone_number: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> AppResult<bool> {
        // single statement so two concurrent verifications cannot both win
        let consumed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE otp_verifications
               SET verified = TRUE
             WHERE id = (
                    SELECT id
                      FROM otp_verifications
                     WHERE phone_number = $1
                       AND code = $2
                       AND verified = FALSE
                       AND expires_at > $3
                     ORDER BY created_at DESC
                     LIMIT 1
                       FOR UPDATE SKIP LOCKED
                   )
            RETURNING id
            "#,
        )
        .bind(phone_number)
        .bind(code)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(consumed.is_some())
    }
}
