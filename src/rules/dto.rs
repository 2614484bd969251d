use serde::Deserialize;

use super::repo_types::{NewRule, RulePatch, RuleType};

fn default_true() -> bool {
    true
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub rule_type: RuleType,
    pub action_name: String,
    pub coin_amount: i64,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "empty_object")]
    pub conditions: serde_json::Value,
}

impl From<CreateRuleRequest> for NewRule {
    fn from(r: CreateRuleRequest) -> Self {
        NewRule {
            rule_type: r.rule_type,
            action_name: r.action_name,
            coin_amount: r.coin_amount,
            is_active: r.is_active,
            description: r.description,
            conditions: r.conditions,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub action_name: Option<String>,
    pub coin_amount: Option<i64>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub conditions: Option<serde_json::Value>,
}

impl From<UpdateRuleRequest> for RulePatch {
    fn from(r: UpdateRuleRequest) -> Self {
        RulePatch {
            action_name: r.action_name,
            coin_amount: r.coin_amount,
            is_active: r.is_active,
            description: r.description,
            conditions: r.conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults() {
        let req: CreateRuleRequest =
            serde_json::from_str(r#"{"rule_type":"earning","action_name":"food_scan","coin_amount":5}"#)
                .unwrap();
        let rule = NewRule::from(req);
        assert!(rule.is_active);
        assert_eq!(rule.conditions, serde_json::json!({}));
        assert_eq!(rule.rule_type, RuleType::Earning);
    }

    #[test]
    fn unknown_rule_type_is_rejected() {
        let res = serde_json::from_str::<CreateRuleRequest>(
            r#"{"rule_type":"bonus","action_name":"food_scan","coin_amount":5}"#,
        );
        assert!(res.is_err());
    }
}
