use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "coin_rule_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Earning,
    Spending,
}

impl RuleType {
    /// Signed ledger amount for a rule of this type.
    pub fn signed(self, coin_amount: i64) -> i64 {
        match self {
            RuleType::Earning => coin_amount,
            RuleType::Spending => -coin_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct CoinRule {
    pub id: Uuid,
    pub rule_type: RuleType,
    pub action_name: String,
    pub coin_amount: i64,
    pub is_active: bool,
    pub description: Option<String>,
    pub conditions: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRule {
    pub rule_type: RuleType,
    pub action_name: String,
    pub coin_amount: i64,
    pub is_active: bool,
    pub description: Option<String>,
    pub conditions: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub action_name: Option<String>,
    pub coin_amount: Option<i64>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
    pub conditions: Option<serde_json::Value>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.action_name.is_none()
            && self.coin_amount.is_none()
            && self.is_active.is_none()
            && self.description.is_none()
            && self.conditions.is_none()
    }
}
