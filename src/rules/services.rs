use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::repo_types::{CoinRule, NewRule, RulePatch, RuleType};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// Rules split by direction, newest first within each group.
#[derive(Debug, Serialize)]
pub struct RuleCatalog {
    pub earning_rules: Vec<CoinRule>,
    pub spending_rules: Vec<CoinRule>,
    pub total_rules: usize,
}

pub fn validate_action_name(name: &str) -> AppResult<()> {
    lazy_static! {
        static ref ACTION_RE: Regex = Regex::new(r"^[a-z][a-z0-9_]{1,63}$").unwrap();
    }
    if !ACTION_RE.is_match(name) {
        return Err(AppError::validation(
            "action_name must be 2-64 chars of lowercase letters, digits or underscores, starting with a letter",
        ));
    }
    Ok(())
}

fn validate_coin_amount(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::validation("coin_amount must be positive"));
    }
    Ok(())
}

fn validate_conditions(conditions: &serde_json::Value) -> AppResult<()> {
    if !conditions.is_object() {
        return Err(AppError::validation("conditions must be a JSON object"));
    }
    Ok(())
}

pub async fn list_rules(state: &AppState) -> AppResult<RuleCatalog> {
    let rules = state.store.list_rules().await?;
    let total_rules = rules.len();
    let (earning_rules, spending_rules) = rules
        .into_iter()
        .partition(|r| r.rule_type == RuleType::Earning);
    Ok(RuleCatalog {
        earning_rules,
        spending_rules,
        total_rules,
    })
}

pub async fn create_rule(state: &AppState, mut new: NewRule) -> AppResult<CoinRule> {
    new.action_name = new.action_name.trim().to_string();
    validate_action_name(&new.action_name)?;
    validate_coin_amount(new.coin_amount)?;
    validate_conditions(&new.conditions)?;

    let rule = state.store.insert_rule(new).await?;
    info!(rule_id = %rule.id, action = %rule.action_name, rule_type = ?rule.rule_type, "coin rule created");
    Ok(rule)
}

pub async fn update_rule(state: &AppState, id: Uuid, mut patch: RulePatch) -> AppResult<CoinRule> {
    if patch.is_empty() {
        return Err(AppError::validation("nothing to update"));
    }
    if let Some(name) = patch.action_name.take() {
        let name = name.trim().to_string();
        validate_action_name(&name)?;
        patch.action_name = Some(name);
    }
    if let Some(amount) = patch.coin_amount {
        validate_coin_amount(amount)?;
    }
    if let Some(conditions) = &patch.conditions {
        validate_conditions(conditions)?;
    }

    let rule = state
        .store
        .update_rule(id, patch)
        .await?
        .ok_or(AppError::NotFound("rule"))?;
    info!(rule_id = %rule.id, action = %rule.action_name, "coin rule updated");
    Ok(rule)
}

pub async fn delete_rule(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.store.delete_rule(id).await? {
        return Err(AppError::NotFound("rule"));
    }
    info!(rule_id = %id, "coin rule deleted");
    Ok(())
}

pub async fn toggle_rule(state: &AppState, id: Uuid) -> AppResult<CoinRule> {
    let rule = state
        .store
        .toggle_rule(id)
        .await?
        .ok_or(AppError::NotFound("rule"))?;
    info!(rule_id = %rule.id, is_active = rule.is_active, "coin rule toggled");
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::services::Actor, users::repo_types::NewUser};

    fn new_rule(rule_type: RuleType, action: &str, amount: i64) -> NewRule {
        NewRule {
            rule_type,
            action_name: action.into(),
            coin_amount: amount,
            is_active: true,
            description: Some(format!("{action} reward")),
            conditions: serde_json::json!({}),
        }
    }

    #[test]
    fn action_name_pattern() {
        for ok in ["food_scan", "ab", "daily_login_7"] {
            assert!(validate_action_name(ok).is_ok(), "{ok}");
        }
        let too_long = format!("a{}", "b".repeat(64));
        for bad in ["a", "Food_scan", "1scan", "food-scan", "", too_long.as_str()] {
            assert!(validate_action_name(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let state = AppState::fake();
        create_rule(&state, new_rule(RuleType::Earning, "food_scan", 5)).await.unwrap();

        let dup = create_rule(&state, new_rule(RuleType::Earning, "food_scan", 9)).await.unwrap_err();
        assert!(matches!(dup, AppError::Conflict(_)));

        // same name on the other side is allowed
        create_rule(&state, new_rule(RuleType::Spending, "food_scan", 1)).await.unwrap();

        let zero = create_rule(&state, new_rule(RuleType::Earning, "share", 0)).await.unwrap_err();
        assert!(matches!(zero, AppError::Validation(_)));

        let mut bad_conditions = new_rule(RuleType::Earning, "share", 1);
        bad_conditions.conditions = serde_json::json!([1, 2]);
        assert!(matches!(
            create_rule(&state, bad_conditions).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn list_groups_by_type() {
        let state = AppState::fake();
        create_rule(&state, new_rule(RuleType::Earning, "food_scan", 5)).await.unwrap();
        create_rule(&state, new_rule(RuleType::Earning, "daily_login", 1)).await.unwrap();
        create_rule(&state, new_rule(RuleType::Spending, "premium_report", 20)).await.unwrap();

        let catalog = list_rules(&state).await.unwrap();
        assert_eq!(catalog.total_rules, 3);
        assert_eq!(catalog.earning_rules.len(), 2);
        assert_eq!(catalog.spending_rules.len(), 1);
        assert_eq!(catalog.earning_rules[0].action_name, "daily_login");
    }

    #[tokio::test]
    async fn update_toggle_and_delete() {
        let state = AppState::fake();
        let rule = create_rule(&state, new_rule(RuleType::Earning, "food_scan", 5)).await.unwrap();

        let empty = update_rule(&state, rule.id, RulePatch::default()).await.unwrap_err();
        assert!(matches!(empty, AppError::Validation(_)));

        let updated = update_rule(
            &state,
            rule.id,
            RulePatch {
                coin_amount: Some(8),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.coin_amount, 8);

        let toggled = toggle_rule(&state, rule.id).await.unwrap();
        assert!(!toggled.is_active);
        assert!(toggle_rule(&state, rule.id).await.unwrap().is_active);

        delete_rule(&state, rule.id).await.unwrap();
        assert!(matches!(delete_rule(&state, rule.id).await.unwrap_err(), AppError::NotFound(_)));
        assert!(matches!(toggle_rule(&state, rule.id).await.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn editing_a_rule_keeps_past_transactions() {
        let state = AppState::fake();
        let user = state
            .store
            .insert_user(NewUser {
                phone_number: "+15550200000".into(),
                name: None,
                email: None,
            })
            .await
            .unwrap();
        let rule = create_rule(&state, new_rule(RuleType::Earning, "food_scan", 5)).await.unwrap();
        let first = state.ledger.apply_rule(user.id, "food_scan").await.unwrap();

        update_rule(
            &state,
            rule.id,
            RulePatch {
                coin_amount: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        state.ledger.apply_rule(user.id, "food_scan").await.unwrap();

        let history = state.ledger.history(user.id, None).await.unwrap();
        let original = history.iter().find(|t| t.id == first.id).unwrap();
        assert_eq!(original.amount, 5);
        assert_eq!(state.ledger.balance(user.id).await.unwrap(), 55);

        // unrelated manual postings still work alongside rules
        state.ledger.adjust(user.id, -55, "reset", Actor::System).await.unwrap();
        assert_eq!(state.ledger.balance(user.id).await.unwrap(), 0);
    }
}
