use serde::Deserialize;
use uuid::Uuid;

use super::repo_types::{LoginStatus, SecurityEventType, Severity};

#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    pub event_type: Option<SecurityEventType>,
    pub severity: Option<Severity>,
    pub admin_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginHistoryQuery {
    pub status: Option<LoginStatus>,
    pub username: Option<String>,
    pub limit: Option<i64>,
}
