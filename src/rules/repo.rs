use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{CoinRule, NewRule, RulePatch};
use crate::{
    error::AppResult,
    store::{PgStore, RuleStore},
};

const RULE_COLUMNS: &str = "id, rule_type, action_name, coin_amount, is_active, description, \
                            conditions, created_at, updated_at";

#[async_trait]
impl RuleStore for PgStore {
    async fn list_rules(&self) -> AppResult<Vec<CoinRule>> {
        let rules = sqlx::query_as::<_, CoinRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM coin_rules ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rules)
    }

    async fn rules_by_action(&self, action_name: &str) -> AppResult<Vec<CoinRule>> {
        let rules = sqlx::query_as::<_, CoinRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM coin_rules WHERE action_name = $1"
        ))
        .bind(action_name)
        .fetch_all(&self.db)
        .await?;
        Ok(rules)
    }

    async fn insert_rule(&self, new: NewRule) -> AppResult<CoinRule> {
        let rule = sqlx::query_as::<_, CoinRule>(&format!(
            r#"
            INSERT INTO coin_rules
                (id, rule_type, action_name, coin_amount, is_active, description, conditions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.rule_type)
        .bind(&new.action_name)
        .bind(new.coin_amount)
        .bind(new.is_active)
        .bind(&new.description)
        .bind(&new.conditions)
        .fetch_one(&self.db)
        .await?;
        Ok(rule)
    }

    async fn update_rule(&self, id: Uuid, patch: RulePatch) -> AppResult<Option<CoinRule>> {
        let rule = sqlx::query_as::<_, CoinRule>(&format!(
            r#"
            UPDATE coin_rules
               SET action_name = COALESCE($2, action_name),
                   coin_amount = COALESCE($3, coin_amount),
                   is_active   = COALESCE($4, is_active),
                   description = COALESCE($5, description),
                   conditions  = COALESCE($6, conditions),
                   updated_at  = NOW()
             WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.action_name)
        .bind(patch.coin_amount)
        .bind(patch.is_active)
        .bind(&patch.description)
        .bind(&patch.conditions)
        .fetch_optional(&self.db)
        .await?;
        Ok(rule)
    }

    async fn delete_rule(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM coin_rules WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn toggle_rule(&self, id: Uuid) -> AppResult<Option<CoinRule>> {
        let rule = sqlx::query_as::<_, CoinRule>(&format!(
            r#"
            UPDATE coin_rules
               SET is_active = NOT is_active, updated_at = NOW()
             WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(rule)
    }
}
