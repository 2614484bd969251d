use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::admin::capability::Capability;
use crate::ledger::LedgerError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("missing capability `{0}`")]
    Forbidden(Capability),

    #[error("account is locked, try again later")]
    AccountLocked,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Ledger(LedgerError::Validation(_)) | AppError::Validation(_) => {
                "validation_error"
            }
            AppError::Ledger(LedgerError::InsufficientBalance { .. }) => "insufficient_balance",
            AppError::Ledger(LedgerError::UserNotFound) => "user_not_found",
            AppError::Ledger(LedgerError::RuleNotFound(_)) => "rule_not_found",
            AppError::Ledger(LedgerError::RuleInactive(_)) => "rule_inactive",
            AppError::Ledger(LedgerError::ConcurrentModification) => "concurrent_modification",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::AccountLocked => "account_locked",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Ledger(LedgerError::Validation(_)) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Ledger(LedgerError::InsufficientBalance { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Ledger(LedgerError::UserNotFound)
            | AppError::Ledger(LedgerError::RuleNotFound(_))
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Ledger(LedgerError::RuleInactive(_))
            | AppError::Ledger(LedgerError::ConcurrentModification)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::AccountLocked => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, AppError::Ledger(LedgerError::ConcurrentModification))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => {
                    return AppError::Ledger(LedgerError::ConcurrentModification)
                }
                // unique_violation
                Some("23505") => {
                    let what = db.constraint().unwrap_or("unique constraint").to_string();
                    return AppError::Conflict(format!("duplicate value violates {what}"));
                }
                _ => {}
            }
        }
        AppError::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Internal(e) = &self {
            error!(error = ?e, "internal error");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ledger_errors_map_to_statuses() {
        let insufficient = AppError::from(LedgerError::InsufficientBalance {
            user_id: Uuid::new_v4(),
            balance: 100,
            requested: -150,
        });
        assert_eq!(insufficient.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(insufficient.code(), "insufficient_balance");

        let inactive = AppError::from(LedgerError::RuleInactive("daily_login".into()));
        assert_eq!(inactive.status(), StatusCode::CONFLICT);
        assert!(inactive.to_string().contains("daily_login"));

        assert_eq!(
            AppError::from(LedgerError::UserNotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_error_message_is_not_leaked() {
        let err = AppError::Internal(anyhow::anyhow!("password=hunter2"));
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn forbidden_names_the_capability() {
        let err = AppError::Forbidden(Capability::AdjustCoins);
        assert_eq!(err.to_string(), "missing capability `adjust_coins`");
    }
}
