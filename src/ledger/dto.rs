use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{error::LedgerError, repo_types::CoinTransaction};

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub coins: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<CoinTransaction>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct UserCoinsResponse {
    pub user_id: Uuid,
    pub coins: i64,
    pub transactions: Vec<CoinTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub receiver_phone: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub debit: CoinTransaction,
    pub credit: CoinTransaction,
    pub new_balance: i64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Add,
    Subtract,
}

/// Manual adjustment. Either a signed `amount`, or a positive `amount`
/// together with `adjustment_type`.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub user_id: Uuid,
    pub amount: i64,
    pub adjustment_type: Option<AdjustmentType>,
    pub reason: String,
}

impl AdjustRequest {
    pub fn signed_amount(&self) -> Result<i64, LedgerError> {
        match self.adjustment_type {
            None => Ok(self.amount),
            Some(_) if self.amount <= 0 => Err(LedgerError::Validation(
                "amount must be positive when adjustment_type is given".into(),
            )),
            Some(AdjustmentType::Add) => Ok(self.amount),
            Some(AdjustmentType::Subtract) => Ok(-self.amount),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyRuleRequest {
    pub user_id: Uuid,
    pub action_name: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    #[serde(default)]
    pub manual_only: bool,
}
