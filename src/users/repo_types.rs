use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ledger::repo_types::LedgerEntry;

/// App user. `coins` is the cached ledger balance and is only written by
/// ledger postings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub coins: i64,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Ledger entry posted in the same transaction that creates the user.
#[derive(Debug, Clone)]
pub struct OpeningBalance {
    pub amount: i64,
    pub description: String,
    pub admin_id: Option<Uuid>,
}

impl OpeningBalance {
    pub fn entry_for(&self, user_id: Uuid) -> LedgerEntry {
        LedgerEntry {
            user_id,
            amount: self.amount,
            description: self.description.clone(),
            admin_id: self.admin_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub phone_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.phone_number.is_none() && self.name.is_none() && self.email.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}
