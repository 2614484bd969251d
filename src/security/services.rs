use axum::http::HeaderMap;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::{
    LoginAttempt, LoginAttemptQuery, LoginStats, LoginStatus, NewLoginAttempt, NewSecurityEvent,
    SecurityEvent, SecurityEventQuery, SecurityEventStats, SecurityEventType, Severity,
};
use crate::{
    error::AppResult,
    ledger::services::{stats_window, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT},
    state::AppState,
};

pub const UNKNOWN_IP: &str = "unknown";

/// First hop of `X-Forwarded-For`, or `unknown`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

/// Appends to the login history. A failed write is logged and swallowed so
/// the audit trail never decides the outcome of a login.
pub async fn log_login_attempt(
    state: &AppState,
    username: &str,
    status: LoginStatus,
    failure_reason: Option<&str>,
    ip_address: &str,
) {
    let new = NewLoginAttempt {
        username: username.to_string(),
        login_status: status,
        failure_reason: failure_reason.map(str::to_string),
        ip_address: ip_address.to_string(),
    };
    if let Err(e) = state.store.insert_login_attempt(new).await {
        warn!(error = %e, %username, ?status, "failed to record login attempt");
    }
}

/// Same contract as [`log_login_attempt`].
pub async fn log_event(
    state: &AppState,
    event_type: SecurityEventType,
    username: &str,
    admin_id: Option<Uuid>,
    ip_address: &str,
    details: serde_json::Value,
) {
    let severity = event_type.severity();
    if severity >= Severity::High {
        warn!(?event_type, %username, ip = %ip_address, "security event");
    } else {
        info!(?event_type, %username, ip = %ip_address, "security event");
    }
    let new = NewSecurityEvent {
        event_type,
        username: username.to_string(),
        admin_id,
        ip_address: ip_address.to_string(),
        details,
    };
    if let Err(e) = state.store.insert_security_event(new).await {
        warn!(error = %e, ?event_type, "failed to record security event");
    }
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

pub async fn list_events(
    state: &AppState,
    event_type: Option<SecurityEventType>,
    severity: Option<Severity>,
    admin_id: Option<Uuid>,
    limit: Option<i64>,
) -> AppResult<Vec<SecurityEvent>> {
    let query = SecurityEventQuery {
        event_type,
        severity,
        admin_id,
        limit: clamp_limit(limit),
    };
    state.store.list_security_events(&query).await
}

pub async fn event_stats(state: &AppState) -> AppResult<SecurityEventStats> {
    let window = stats_window(OffsetDateTime::now_utc());
    state.store.security_event_stats(&window).await
}

pub async fn login_history(
    state: &AppState,
    status: Option<LoginStatus>,
    username: Option<String>,
    limit: Option<i64>,
) -> AppResult<Vec<LoginAttempt>> {
    let query = LoginAttemptQuery {
        status,
        username: username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
        limit: clamp_limit(limit),
    };
    state.store.list_login_attempts(&query).await
}

pub async fn login_stats(state: &AppState) -> AppResult<LoginStats> {
    let window = stats_window(OffsetDateTime::now_utc());
    let counts = state.store.login_counts(&window).await?;
    let success_rate = success_rate(counts.successful_logins, counts.total_attempts);
    Ok(LoginStats {
        counts,
        success_rate,
    })
}

fn success_rate(successful: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = successful as f64 * 100.0 / total as f64;
    (pct * 100.0).round() / 100.0
}
