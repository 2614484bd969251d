use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Direction of a ledger entry; always agrees with the sign of `amount`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "coin_transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Add,
    Subtract,
}

impl TransactionType {
    pub fn for_amount(amount: i64) -> Self {
        if amount < 0 {
            TransactionType::Subtract
        } else {
            TransactionType::Add
        }
    }
}

/// Append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct CoinTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub admin_id: Option<Uuid>,   // set for manual adjustments only
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A balance change waiting to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub user_id: Uuid,
    pub amount: i64,
    pub description: String,
    pub admin_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub user_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub manual_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Lower bounds of the rolling windows counted in [`TransactionStats`].
#[derive(Debug, Clone, Copy)]
pub struct StatsWindow {
    pub today: OffsetDateTime,
    pub week: OffsetDateTime,
    pub month: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq, FromRow)]
pub struct TransactionStats {
    pub total_transactions: i64,
    pub total_coins_added: i64,
    pub total_coins_removed: i64,
    #[sqlx(skip)]
    pub net_coins: i64,
    pub transactions_today: i64,
    pub transactions_this_week: i64,
    pub transactions_this_month: i64,
}
