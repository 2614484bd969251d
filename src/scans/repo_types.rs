use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A recognised meal photo. `nutrition` is the analysis payload as the
/// client sent it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct FoodScan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub food_name: String,
    pub confidence: i32,
    pub image_path: Option<String>,
    pub nutrition: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub user_id: Uuid,
    pub food_name: String,
    pub confidence: i32,
    pub image_path: Option<String>,
    pub nutrition: serde_json::Value,
}
