use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::CapabilitySet;

#[derive(Debug, Serialize)]
pub struct AdminMe {
    pub id: Uuid,
    pub username: String,
    pub role_name: String,
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub role_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub capabilities: CapabilitySet,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub capabilities: Option<CapabilitySet>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role_id: Uuid,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAdminRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::capability::Capability;

    #[test]
    fn role_request_rejects_unknown_capabilities() {
        let ok: CreateRoleRequest = serde_json::from_str(
            r#"{"role_name":"support","capabilities":["view_users","view_ledger"]}"#,
        )
        .unwrap();
        assert!(ok.capabilities.contains(Capability::ViewLedger));

        let bad = serde_json::from_str::<CreateRoleRequest>(
            r#"{"role_name":"support","capabilities":["dashboard"]}"#,
        );
        assert!(bad.is_err());
    }
}
