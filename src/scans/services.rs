use tracing::info;
use uuid::Uuid;

use super::repo_types::{FoodScan, NewScan};
use crate::{
    error::{AppError, AppResult},
    ledger::{repo_types::CoinTransaction, services::retry_concurrent, LedgerError},
    state::AppState,
};

/// Coin rule looked up for every recorded scan.
pub const SCAN_ACTION: &str = "food_scan";
pub const DEFAULT_RECENT_LIMIT: i64 = 10;
pub const MAX_RECENT_LIMIT: i64 = 100;
const MAX_FOOD_NAME_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct ScanInput {
    pub food_name: String,
    pub confidence: i32,
    pub image_path: Option<String>,
    pub nutrition: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ScanRecorded {
    pub scan: FoodScan,
    pub transaction: Option<CoinTransaction>,
    pub total_coins: i64,
}

impl ScanRecorded {
    pub fn coins_earned(&self) -> i64 {
        self.transaction.as_ref().map(|t| t.amount).unwrap_or(0)
    }
}

/// Stores the scan and posts the `food_scan` rule in the same atomic step.
/// Without an active rule the scan is stored and earns nothing.
pub async fn record_scan(state: &AppState, user_id: Uuid, input: ScanInput) -> AppResult<ScanRecorded> {
    let food_name = input.food_name.trim().to_string();
    if food_name.is_empty() || food_name.chars().count() > MAX_FOOD_NAME_LEN {
        return Err(AppError::validation(format!(
            "food_name must be 1 to {MAX_FOOD_NAME_LEN} characters"
        )));
    }
    if !(0..=100).contains(&input.confidence) {
        return Err(AppError::validation("confidence must be between 0 and 100"));
    }
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let reward = match state.ledger.rule_entry(user_id, SCAN_ACTION).await {
        Ok(mut entry) => {
            entry.description = format!("Scanned {food_name}");
            Some(entry)
        }
        Err(AppError::Ledger(LedgerError::RuleNotFound(_) | LedgerError::RuleInactive(_))) => None,
        Err(e) => return Err(e),
    };

    let new = NewScan {
        user_id,
        food_name,
        confidence: input.confidence,
        image_path: input.image_path.filter(|p| !p.trim().is_empty()),
        nutrition: input.nutrition,
    };
    let store = state.store.clone();
    let (scan, transaction) = retry_concurrent(state.ledger.max_retries(), || {
        let store = store.clone();
        let new = new.clone();
        let reward = reward.clone();
        async move { store.record_scan(new, reward).await }
    })
    .await?;

    let total_coins = transaction
        .as_ref()
        .map(|t| t.balance_after)
        .unwrap_or(user.coins);
    info!(
        %user_id,
        scan_id = %scan.id,
        food = %scan.food_name,
        coins = transaction.as_ref().map(|t| t.amount).unwrap_or(0),
        "scan recorded"
    );
    Ok(ScanRecorded {
        scan,
        transaction,
        total_coins,
    })
}

pub async fn recent_scans(state: &AppState, user_id: Uuid, limit: Option<i64>) -> AppResult<Vec<FoodScan>> {
    let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT);
    state.store.recent_scans(user_id, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::repo_types::TransactionFilter,
        rules::repo_types::{NewRule, RuleType},
        users::repo_types::NewUser,
    };

    async fn user(state: &AppState, phone: &str) -> Uuid {
        state
            .store
            .insert_user(NewUser {
                phone_number: phone.into(),
                name: None,
                email: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn scan_rule(state: &AppState, rule_type: RuleType, amount: i64) {
        state
            .store
            .insert_rule(NewRule {
                rule_type,
                action_name: SCAN_ACTION.into(),
                coin_amount: amount,
                is_active: true,
                description: None,
                conditions: serde_json::json!({}),
            })
            .await
            .unwrap();
    }

    fn input(name: &str) -> ScanInput {
        ScanInput {
            food_name: name.into(),
            confidence: 87,
            image_path: Some("uploads/salad.jpg".into()),
            nutrition: serde_json::json!({ "calories": 320 }),
        }
    }

    #[tokio::test]
    async fn scan_is_stored_and_rewarded_by_rule() {
        let state = AppState::fake();
        let id = user(&state, "+15550400000").await;
        scan_rule(&state, RuleType::Earning, 3).await;

        let done = record_scan(&state, id, input("  Greek salad ")).await.unwrap();
        assert_eq!(done.scan.food_name, "Greek salad");
        assert_eq!(done.coins_earned(), 3);
        assert_eq!(done.total_coins, 3);
        let tx = done.transaction.unwrap();
        assert_eq!(tx.description, "Scanned Greek salad");
        assert_eq!(state.ledger.balance(id).await.unwrap(), 3);

        record_scan(&state, id, input("Ramen")).await.unwrap();
        let recent = recent_scans(&state, id, None).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].food_name, "Ramen");
        assert_eq!(recent_scans(&state, id, Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_without_rule_earns_nothing() {
        let state = AppState::fake();
        let id = user(&state, "+15550400010").await;
        let done = record_scan(&state, id, input("Toast")).await.unwrap();
        assert_eq!(done.coins_earned(), 0);
        assert_eq!(done.total_coins, 0);
        assert_eq!(recent_scans(&state, id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refused_reward_stores_no_scan() {
        let state = AppState::fake();
        let id = user(&state, "+15550400020").await;
        // a spending rule the user cannot afford
        scan_rule(&state, RuleType::Spending, 2).await;

        let err = record_scan(&state, id, input("Pizza")).await.unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::InsufficientBalance { .. })));
        assert!(recent_scans(&state, id, None).await.unwrap().is_empty());
        assert!(state
            .ledger
            .transactions(TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn scan_input_is_validated() {
        let state = AppState::fake();
        let id = user(&state, "+15550400030").await;
        let mut bad = input("Soup");
        bad.confidence = 101;
        assert!(matches!(record_scan(&state, id, bad).await, Err(AppError::Validation(_))));
        assert!(matches!(
            record_scan(&state, id, input("   ")).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            record_scan(&state, Uuid::new_v4(), input("Soup")).await,
            Err(AppError::NotFound(_))
        ));
    }
}
