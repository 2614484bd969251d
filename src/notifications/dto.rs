use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_type() -> String {
    "system".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct InboxQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub user_id: Uuid,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(default = "default_type")]
    pub notification_type: String,
    pub extra_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_type_defaults_to_system() {
        let req: SendNotificationRequest = serde_json::from_value(serde_json::json!({
            "user_id": Uuid::nil(),
            "title": "Hi",
            "message": "Welcome"
        }))
        .unwrap();
        assert_eq!(req.notification_type, "system");
        assert!(req.extra_data.is_none());
    }
}
