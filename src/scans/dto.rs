use serde::{Deserialize, Serialize};

use super::repo_types::FoodScan;
use crate::ledger::repo_types::CoinTransaction;

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct RecordScanRequest {
    pub food_name: String,
    pub confidence: i32,
    pub image_path: Option<String>,
    #[serde(default = "empty_object")]
    pub nutrition: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub scan: FoodScan,
    pub coins_earned: i64,
    pub total_coins: i64,
    pub transaction: Option<CoinTransaction>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}
