use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[sqlx(type_name = "login_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failed,
    Blocked,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[sqlx(type_name = "security_severity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type,
)]
#[sqlx(type_name = "security_event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    PasswordChange,
}

impl SecurityEventType {
    pub fn severity(self) -> Severity {
        match self {
            SecurityEventType::LoginSuccess | SecurityEventType::PasswordChange => Severity::Low,
            SecurityEventType::LoginFailed => Severity::Medium,
            SecurityEventType::AccountLocked => Severity::High,
        }
    }
}

/// One row of the admin login history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub username: String,
    pub login_status: LoginStatus,
    pub failure_reason: Option<String>,
    pub ip_address: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub username: String,
    pub login_status: LoginStatus,
    pub failure_reason: Option<String>,
    pub ip_address: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoginAttemptQuery {
    pub status: Option<LoginStatus>,
    pub username: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq, FromRow)]
pub struct LoginCounts {
    pub total_attempts: i64,
    pub attempts_today: i64,
    pub attempts_this_week: i64,
    pub successful_logins: i64,
    pub failed_attempts: i64,
    pub blocked_attempts: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginStats {
    #[serde(flatten)]
    pub counts: LoginCounts,
    /// Percentage of successful attempts, two decimals.
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub username: String,
    pub admin_id: Option<Uuid>,
    pub ip_address: String,
    pub details: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Severity is derived from the event type when stored.
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: SecurityEventType,
    pub username: String,
    pub admin_id: Option<Uuid>,
    pub ip_address: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityEventQuery {
    pub event_type: Option<SecurityEventType>,
    pub severity: Option<Severity>,
    pub admin_id: Option<Uuid>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SecurityEventStats {
    pub total_events: i64,
    pub events_today: i64,
    pub events_this_week: i64,
    pub by_severity: BTreeMap<Severity, i64>,
    pub by_type: BTreeMap<SecurityEventType, i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_maps_serialize_with_wire_names() {
        let stats = SecurityEventStats {
            total_events: 2,
            events_today: 2,
            events_this_week: 2,
            by_severity: [(Severity::High, 1), (Severity::Medium, 1)].into(),
            by_type: [
                (SecurityEventType::AccountLocked, 1),
                (SecurityEventType::LoginFailed, 1),
            ]
            .into(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_severity"]["high"], 1);
        assert_eq!(json["by_type"]["account_locked"], 1);
        assert_eq!(json["by_type"]["login_failed"], 1);
    }

    #[test]
    fn login_stats_flatten_counts() {
        let stats = LoginStats {
            counts: LoginCounts {
                total_attempts: 4,
                successful_logins: 3,
                ..Default::default()
            },
            success_rate: 75.0,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_attempts"], 4);
        assert_eq!(json["success_rate"], 75.0);
    }
}
