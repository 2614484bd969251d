use std::{future::Future, sync::Arc, time::Duration};

use time::{Duration as TimeDuration, OffsetDateTime, Time};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    error::LedgerError,
    repo_types::{CoinTransaction, LedgerEntry, StatsWindow, TransactionFilter, TransactionStats},
};
use crate::{
    error::{AppError, AppResult},
    rules::repo_types::CoinRule,
    store::Store,
    users::services::normalize_phone,
};

pub const MAX_REASON_LEN: usize = 500;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;
pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Who initiated a balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin(Uuid),
    System,
}

impl Actor {
    pub fn admin_id(self) -> Option<Uuid> {
        match self {
            Actor::Admin(id) => Some(id),
            Actor::System => None,
        }
    }
}

/// Result of a completed transfer: the sender's debit and the receiver's credit.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub debit: CoinTransaction,
    pub credit: CoinTransaction,
}

/// Coin ledger operations. Every balance change is one atomic posting
/// through the store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    max_retries: u32,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    pub async fn adjust(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        actor: Actor,
    ) -> AppResult<CoinTransaction> {
        validate_amount(amount)?;
        let reason = validate_reason(reason)?;

        let entry = LedgerEntry {
            user_id,
            amount,
            description: reason,
            admin_id: actor.admin_id(),
        };
        let tx = single(self.post(vec![entry]).await?)?;
        info!(%user_id, amount, balance = tx.balance_after, ?actor, "coins adjusted");
        Ok(tx)
    }

    /// The entry the active rule for `action_name` would post for the user.
    /// Callers that persist something alongside the coins post it themselves.
    pub async fn rule_entry(&self, user_id: Uuid, action_name: &str) -> AppResult<LedgerEntry> {
        let rules = self.store.rules_by_action(action_name).await?;
        let rule = select_rule(action_name, &rules)?;

        let description = rule
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| rule.action_name.clone());
        Ok(LedgerEntry {
            user_id,
            amount: rule.rule_type.signed(rule.coin_amount),
            description,
            admin_id: None,
        })
    }

    pub async fn apply_rule(&self, user_id: Uuid, action_name: &str) -> AppResult<CoinTransaction> {
        let entry = self.rule_entry(user_id, action_name).await?;
        let tx = single(self.post(vec![entry]).await?)?;
        info!(%user_id, action = action_name, amount = tx.amount, "coin rule applied");
        Ok(tx)
    }

    pub async fn transfer(
        &self,
        sender_id: Uuid,
        receiver_phone: &str,
        amount: i64,
    ) -> AppResult<Transfer> {
        if amount <= 0 {
            return Err(LedgerError::Validation("transfer amount must be positive".into()).into());
        }
        let phone = normalize_phone(receiver_phone)
            .ok_or_else(|| LedgerError::Validation("invalid receiver phone number".into()))?;
        let sender = self
            .store
            .get_user(sender_id)
            .await?
            .ok_or(LedgerError::UserNotFound)?;
        let receiver = self
            .store
            .find_user_by_phone(&phone)
            .await?
            .ok_or(LedgerError::UserNotFound)?;
        if receiver.id == sender.id {
            return Err(LedgerError::Validation("cannot transfer coins to yourself".into()).into());
        }

        let entries = vec![
            LedgerEntry {
                user_id: sender.id,
                amount: -amount,
                description: format!("Transfer to {}", receiver.phone_number),
                admin_id: None,
            },
            LedgerEntry {
                user_id: receiver.id,
                amount,
                description: format!("Transfer from {}", sender.phone_number),
                admin_id: None,
            },
        ];
        let mut posted = self.post(entries).await?.into_iter();
        let (Some(debit), Some(credit)) = (posted.next(), posted.next()) else {
            return Err(anyhow::anyhow!("transfer posting returned fewer than two entries").into());
        };
        info!(sender = %sender.id, receiver = %receiver.id, amount, "coins transferred");
        Ok(Transfer { debit, credit })
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<i64> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(LedgerError::UserNotFound)?;
        Ok(user.coins)
    }

    pub async fn history(&self, user_id: Uuid, limit: Option<i64>) -> AppResult<Vec<CoinTransaction>> {
        let filter = TransactionFilter {
            user_id: Some(user_id),
            limit: Some(limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT)),
            ..Default::default()
        };
        self.store.list_transactions(&filter).await
    }

    pub async fn transactions(&self, mut filter: TransactionFilter) -> AppResult<Vec<CoinTransaction>> {
        filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT));
        filter.offset = Some(filter.offset.unwrap_or(0).max(0));
        self.store.list_transactions(&filter).await
    }

    pub async fn stats(&self, manual_only: bool) -> AppResult<TransactionStats> {
        let window = stats_window(OffsetDateTime::now_utc());
        self.store.transaction_stats(&window, manual_only).await
    }

    /// Posts a batch, retrying on concurrent modification.
    pub(crate) async fn post(&self, entries: Vec<LedgerEntry>) -> AppResult<Vec<CoinTransaction>> {
        let store = self.store.clone();
        retry_concurrent(self.max_retries, || {
            let store = store.clone();
            let entries = entries.clone();
            async move { store.post_entries(&entries).await }
        })
        .await
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Runs `op` again while it fails with a concurrent modification, at most
/// `max_retries` extra times, with a short linear backoff.
pub(crate) async fn retry_concurrent<T, F, Fut>(max_retries: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_concurrent_modification() && attempt < max_retries => {
                attempt += 1;
                warn!(attempt, "concurrent ledger modification, retrying");
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
            }
            other => return other,
        }
    }
}

fn single(mut posted: Vec<CoinTransaction>) -> AppResult<CoinTransaction> {
    posted
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("posting returned no entries")))
}

pub fn validate_amount(amount: i64) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::Validation("amount must be a nonzero integer".into()));
    }
    Ok(())
}

pub fn validate_reason(reason: &str) -> Result<String, LedgerError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::Validation("a reason is required".into()));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(LedgerError::Validation(format!(
            "reason must be at most {MAX_REASON_LEN} characters"
        )));
    }
    Ok(reason.to_string())
}

/// Picks the single active rule among those sharing `action_name`.
pub fn select_rule<'a>(action_name: &str, rules: &'a [CoinRule]) -> Result<&'a CoinRule, LedgerError> {
    if rules.is_empty() {
        return Err(LedgerError::RuleNotFound(action_name.to_string()));
    }
    let mut active = rules.iter().filter(|r| r.is_active);
    match (active.next(), active.next()) {
        (None, _) => Err(LedgerError::RuleInactive(action_name.to_string())),
        (Some(rule), None) => Ok(rule),
        (Some(_), Some(_)) => Err(LedgerError::Validation(format!(
            "action `{action_name}` matches both an earning and a spending rule"
        ))),
    }
}

pub fn stats_window(now: OffsetDateTime) -> StatsWindow {
    StatsWindow {
        today: now.replace_time(Time::MIDNIGHT),
        week: now - TimeDuration::days(7),
        month: now - TimeDuration::days(30),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        rules::repo_types::{NewRule, RuleType},
        state::AppState,
        users::repo_types::NewUser,
    };

    async fn user_with(state: &AppState, phone: &str, coins: i64) -> Uuid {
        let user = state
            .store
            .insert_user(NewUser {
                phone_number: phone.into(),
                name: None,
                email: None,
            })
            .await
            .unwrap();
        if coins > 0 {
            state
                .ledger
                .adjust(user.id, coins, "opening balance", Actor::System)
                .await
                .unwrap();
        }
        user.id
    }

    async fn assert_balanced(state: &AppState, user_id: Uuid) {
        let txs = state
            .store
            .list_transactions(&TransactionFilter {
                user_id: Some(user_id),
                limit: Some(10_000),
                ..Default::default()
            })
            .await
            .unwrap();
        let sum: i64 = txs.iter().map(|t| t.amount).sum();
        assert_eq!(state.ledger.balance(user_id).await.unwrap(), sum);
    }

    async fn rule(state: &AppState, rule_type: RuleType, action: &str, amount: i64, active: bool) {
        state
            .store
            .insert_rule(NewRule {
                rule_type,
                action_name: action.into(),
                coin_amount: amount,
                is_active: active,
                description: None,
                conditions: serde_json::json!({}),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn overdraft_fails_and_changes_nothing() {
        let state = AppState::fake();
        let user = user_with(&state, "+15550000001", 100).await;

        let err = state
            .ledger
            .adjust(user, -150, "penalty", Actor::Admin(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::InsufficientBalance { balance: 100, requested: -150, .. })
        ));
        assert_eq!(state.ledger.balance(user).await.unwrap(), 100);
        assert_eq!(state.ledger.history(user, None).await.unwrap().len(), 1);
        assert_balanced(&state, user).await;
    }

    #[tokio::test]
    async fn manual_adjustment_records_admin() {
        let state = AppState::fake();
        let user = user_with(&state, "+15550000002", 0).await;
        let admin = Uuid::new_v4();

        let tx = state
            .ledger
            .adjust(user, 40, "  goodwill  ", Actor::Admin(admin))
            .await
            .unwrap();
        assert_eq!(tx.admin_id, Some(admin));
        assert_eq!(tx.description, "goodwill");
        assert_eq!(tx.balance_after, 40);

        let manual = state
            .ledger
            .transactions(TransactionFilter {
                manual_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(manual.len(), 1);
    }

    #[tokio::test]
    async fn adjust_validates_amount_and_reason() {
        let state = AppState::fake();
        let user = user_with(&state, "+15550000003", 10).await;

        for (amount, reason) in [(0, "x"), (5, "   ")] {
            let err = state
                .ledger
                .adjust(user, amount, reason, Actor::System)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Ledger(LedgerError::Validation(_))));
        }
        let long = "r".repeat(MAX_REASON_LEN + 1);
        assert!(state.ledger.adjust(user, 1, &long, Actor::System).await.is_err());
        assert_eq!(state.ledger.balance(user).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn adjust_unknown_user_is_not_found() {
        let state = AppState::fake();
        let err = state
            .ledger
            .adjust(Uuid::new_v4(), 5, "bonus", Actor::System)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ledger(LedgerError::UserNotFound)));
    }

    #[tokio::test]
    async fn transfer_moves_coins_with_two_entries() {
        let state = AppState::fake();
        let a = user_with(&state, "+15550000010", 50).await;
        let b = user_with(&state, "+15550000011", 10).await;
        let before = state.ledger.transactions(TransactionFilter::default()).await.unwrap().len();

        let transfer = state.ledger.transfer(a, "+1 555 000 0011", 20).await.unwrap();
        assert_eq!(transfer.debit.amount, -20);
        assert_eq!(transfer.credit.amount, 20);
        assert_eq!(state.ledger.balance(a).await.unwrap(), 30);
        assert_eq!(state.ledger.balance(b).await.unwrap(), 30);

        let after = state.ledger.transactions(TransactionFilter::default()).await.unwrap().len();
        assert_eq!(after, before + 2);
        assert_balanced(&state, a).await;
        assert_balanced(&state, b).await;
    }

    #[tokio::test]
    async fn failed_transfer_changes_neither_side() {
        let state = AppState::fake();
        let a = user_with(&state, "+15550000020", 5).await;
        let b = user_with(&state, "+15550000021", 10).await;
        let before = state.ledger.transactions(TransactionFilter::default()).await.unwrap().len();

        let err = state.ledger.transfer(a, "+15550000021", 20).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(state.ledger.balance(a).await.unwrap(), 5);
        assert_eq!(state.ledger.balance(b).await.unwrap(), 10);
        let after = state.ledger.transactions(TransactionFilter::default()).await.unwrap().len();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn transfer_rejects_bad_requests() {
        let state = AppState::fake();
        let a = user_with(&state, "+15550000030", 50).await;

        let unknown = state.ledger.transfer(a, "+15559999999", 5).await.unwrap_err();
        assert!(matches!(unknown, AppError::Ledger(LedgerError::UserNotFound)));

        let to_self = state.ledger.transfer(a, "+15550000030", 5).await.unwrap_err();
        assert!(matches!(to_self, AppError::Ledger(LedgerError::Validation(_))));

        for amount in [0, -5] {
            let err = state.ledger.transfer(a, "+15550000031", amount).await.unwrap_err();
            assert!(matches!(err, AppError::Ledger(LedgerError::Validation(_))));
        }
        assert_eq!(state.ledger.balance(a).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn rules_credit_and_debit() {
        let state = AppState::fake();
        let user = user_with(&state, "+15550000040", 0).await;
        rule(&state, RuleType::Earning, "food_scan", 5, true).await;
        rule(&state, RuleType::Spending, "premium_report", 3, true).await;

        let earned = state.ledger.apply_rule(user, "food_scan").await.unwrap();
        assert_eq!(earned.amount, 5);
        assert_eq!(earned.admin_id, None);
        assert_eq!(earned.description, "food_scan");

        let spent = state.ledger.apply_rule(user, "premium_report").await.unwrap();
        assert_eq!(spent.amount, -3);
        assert_eq!(state.ledger.balance(user).await.unwrap(), 2);

        // 2 coins left, a 3-coin report is refused
        state.ledger.apply_rule(user, "premium_report").await.unwrap_err();
        assert_eq!(state.ledger.balance(user).await.unwrap(), 2);
        assert_balanced(&state, user).await;
    }

    #[tokio::test]
    async fn inactive_or_unknown_rule_leaves_ledger_untouched() {
        let state = AppState::fake();
        let user = user_with(&state, "+15550000050", 10).await;
        rule(&state, RuleType::Earning, "daily_login", 10, false).await;

        let inactive = state.ledger.apply_rule(user, "daily_login").await.unwrap_err();
        assert!(matches!(inactive, AppError::Ledger(LedgerError::RuleInactive(_))));

        let missing = state.ledger.apply_rule(user, "nope").await.unwrap_err();
        assert!(matches!(missing, AppError::Ledger(LedgerError::RuleNotFound(_))));

        assert_eq!(state.ledger.balance(user).await.unwrap(), 10);
        assert_eq!(state.ledger.history(user, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_adjustments_do_not_lose_updates() {
        let state = AppState::fake();
        let user = user_with(&state, "+15550000060", 0).await;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = state.ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.adjust(user, 2, "batch", Actor::System).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(state.ledger.balance(user).await.unwrap(), 100);
        assert_balanced(&state, user).await;
    }

    #[tokio::test]
    async fn stats_count_added_and_removed() {
        let state = AppState::fake();
        let a = user_with(&state, "+15550000070", 30).await;
        user_with(&state, "+15550000071", 0).await;
        state.ledger.transfer(a, "+15550000071", 10).await.unwrap();
        state
            .ledger
            .adjust(a, -5, "correction", Actor::Admin(Uuid::new_v4()))
            .await
            .unwrap();

        let all = state.ledger.stats(false).await.unwrap();
        assert_eq!(all.total_transactions, 4);
        assert_eq!(all.total_coins_added, 40);
        assert_eq!(all.total_coins_removed, 15);
        assert_eq!(all.net_coins, 25);
        assert_eq!(all.transactions_today, 4);

        let manual = state.ledger.stats(true).await.unwrap();
        assert_eq!(manual.total_transactions, 1);
        assert_eq!(manual.net_coins, -5);
    }

    #[tokio::test]
    async fn retry_gives_up_after_bound() {
        let calls = AtomicU32::new(0);
        let res: AppResult<()> = retry_concurrent(2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LedgerError::ConcurrentModification.into()) }
        })
        .await;
        assert!(res.unwrap_err().is_concurrent_modification());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicU32::new(0);
        let res = retry_concurrent(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(LedgerError::ConcurrentModification.into())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 1);
    }

    #[test]
    fn select_rule_rejects_ambiguous_actions() {
        let now = OffsetDateTime::now_utc();
        let make = |rule_type| CoinRule {
            id: Uuid::new_v4(),
            rule_type,
            action_name: "share".into(),
            coin_amount: 1,
            is_active: true,
            description: None,
            conditions: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        let rules = vec![make(RuleType::Earning), make(RuleType::Spending)];
        assert!(matches!(
            select_rule("share", &rules).unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn stats_window_starts_at_midnight() {
        let now = time::macros::datetime!(2025-03-10 15:42:00 UTC);
        let w = stats_window(now);
        assert_eq!(w.today, time::macros::datetime!(2025-03-10 00:00:00 UTC));
        assert_eq!(w.week, time::macros::datetime!(2025-03-03 15:42:00 UTC));
    }
}
