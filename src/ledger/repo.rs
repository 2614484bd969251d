use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{
    posting::{lock_order, plan_postings},
    repo_types::{CoinTransaction, LedgerEntry, StatsWindow, TransactionFilter, TransactionStats},
};
use crate::{
    error::AppResult,
    store::{LedgerStore, PgStore},
};

const TX_COLUMNS: &str =
    "id, user_id, transaction_type, amount, balance_after, description, admin_id, created_at";

/// Posts a batch inside an open transaction: locks the affected users in id
/// order, checks every running balance, appends the entries and rewrites the
/// cached balances. The caller commits.
pub(crate) async fn post_entries_tx(
    tx: &mut Transaction<'_, Postgres>,
    entries: &[LedgerEntry],
) -> AppResult<Vec<CoinTransaction>> {
    let ids = lock_order(entries);
    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT id, coins
          FROM users
         WHERE id = ANY($1) AND deleted_at IS NULL
         ORDER BY id
           FOR UPDATE
        "#,
    )
    .bind(&ids[..])
    .fetch_all(&mut **tx)
    .await?;

    let mut balances: HashMap<Uuid, i64> = rows.into_iter().collect();
    let planned = plan_postings(&mut balances, entries)?;

    let mut posted = Vec::with_capacity(planned.len());
    for p in planned {
        let row = sqlx::query_as::<_, CoinTransaction>(&format!(
            r#"
            INSERT INTO coin_transactions
                (id, user_id, transaction_type, amount, balance_after, description, admin_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TX_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(p.entry.user_id)
        .bind(p.transaction_type)
        .bind(p.entry.amount)
        .bind(p.balance_after)
        .bind(&p.entry.description)
        .bind(p.entry.admin_id)
        .fetch_one(&mut **tx)
        .await?;
        posted.push(row);
    }

    for (id, balance) in balances {
        sqlx::query("UPDATE users SET coins = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(balance)
            .execute(&mut **tx)
            .await?;
    }

    Ok(posted)
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn post_entries(&self, entries: &[LedgerEntry]) -> AppResult<Vec<CoinTransaction>> {
        let mut tx = self.db.begin().await?;
        let posted = post_entries_tx(&mut tx, entries).await?;
        tx.commit().await?;
        Ok(posted)
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<CoinTransaction>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TX_COLUMNS} FROM coin_transactions WHERE TRUE"
        ));
        if let Some(user_id) = filter.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(ty) = filter.transaction_type {
            qb.push(" AND transaction_type = ").push_bind(ty);
        }
        if filter.manual_only {
            qb.push(" AND admin_id IS NOT NULL");
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0));

        let rows = qb
            .build_query_as::<CoinTransaction>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn transaction_stats(
        &self,
        window: &StatsWindow,
        manual_only: bool,
    ) -> AppResult<TransactionStats> {
        let mut stats = sqlx::query_as::<_, TransactionStats>(
            r#"
            SELECT COUNT(*)                                                   AS total_transactions,
                   COALESCE(SUM(amount) FILTER (WHERE amount > 0), 0)::BIGINT AS total_coins_added,
                   COALESCE(-SUM(amount) FILTER (WHERE amount < 0), 0)::BIGINT AS total_coins_removed,
                   COUNT(*) FILTER (WHERE created_at >= $1)                   AS transactions_today,
                   COUNT(*) FILTER (WHERE created_at >= $2)                   AS transactions_this_week,
                   COUNT(*) FILTER (WHERE created_at >= $3)                   AS transactions_this_month
              FROM coin_transactions
             WHERE ($4 = FALSE OR admin_id IS NOT NULL)
            "#,
        )
        .bind(window.today)
        .bind(window.week)
        .bind(window.month)
        .bind(manual_only)
        .fetch_one(&self.db)
        .await?;
        stats.net_coins = stats.total_coins_added - stats.total_coins_removed;
        Ok(stats)
    }
}
