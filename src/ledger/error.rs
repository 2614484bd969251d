use thiserror::Error;
use uuid::Uuid;

/// Failures of a ledger operation. Every variant leaves balances and the
/// transaction log untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("insufficient balance: user {user_id} has {balance} coins, change of {requested} refused")]
    InsufficientBalance {
        user_id: Uuid,
        balance: i64,
        requested: i64,
    },

    #[error("user not found")]
    UserNotFound,

    #[error("coin rule `{0}` not found")]
    RuleNotFound(String),

    #[error("coin rule `{0}` is inactive")]
    RuleInactive(String),

    #[error("concurrent modification detected, retry the operation")]
    ConcurrentModification,
}
