use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{FoodScan, NewScan};
use crate::{
    error::AppResult,
    ledger::{
        repo::post_entries_tx,
        repo_types::{CoinTransaction, LedgerEntry},
    },
    store::{PgStore, ScanStore},
};

const SCAN_COLUMNS: &str = "id, user_id, food_name, confidence, image_path, nutrition, created_at";

#[async_trait]
impl ScanStore for PgStore {
    async fn record_scan(
        &self,
        new: NewScan,
        reward: Option<LedgerEntry>,
    ) -> AppResult<(FoodScan, Option<CoinTransaction>)> {
        let mut tx = self.db.begin().await?;

        let scan = sqlx::query_as::<_, FoodScan>(&format!(
            r#"
            INSERT INTO food_scans (id, user_id, food_name, confidence, image_path, nutrition)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SCAN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.food_name)
        .bind(new.confidence)
        .bind(&new.image_path)
        .bind(&new.nutrition)
        .fetch_one(&mut *tx)
        .await?;

        let posted = match reward {
            Some(entry) => post_entries_tx(&mut tx, &[entry]).await?.into_iter().next(),
            None => None,
        };

        tx.commit().await?;
        Ok((scan, posted))
    }

    async fn recent_scans(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<FoodScan>> {
        let scans = sqlx::query_as::<_, FoodScan>(&format!(
            r#"
            SELECT {SCAN_COLUMNS}
              FROM food_scans
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(scans)
    }
}
