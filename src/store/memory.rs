use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AdminStore, LedgerStore, NotificationStore, OtpStore, ReferralStore, RuleStore, ScanStore,
    SecurityStore, UserStore,
};
use crate::{
    admin::repo_types::{AdminPatch, AdminUser, NewAdmin, NewRole, Role, RolePatch},
    auth::repo_types::OtpCode,
    error::{AppError, AppResult},
    ledger::{
        posting::{lock_order, plan_postings},
        repo_types::{CoinTransaction, LedgerEntry, StatsWindow, TransactionFilter, TransactionStats},
    },
    notifications::repo_types::{NewNotification, Notification},
    referrals::repo_types::{
        NewReferral, Redemption, RedemptionRequest, Referral, ReferralListItem, ReferralStats,
    },
    rules::repo_types::{CoinRule, NewRule, RulePatch},
    scans::repo_types::{FoodScan, NewScan},
    security::repo_types::{
        LoginAttempt, LoginAttemptQuery, LoginCounts, LoginStatus, NewLoginAttempt,
        NewSecurityEvent, SecurityEvent, SecurityEventQuery, SecurityEventStats,
    },
    users::repo_types::{NewUser, OpeningBalance, User, UserPatch, UserQuery},
};

/// In-process store. Every operation runs inside one critical section, so
/// multi-entry postings are trivially atomic and writes to a user are
/// serialized.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, StoredUser>,
    transactions: Vec<CoinTransaction>, // append order
    rules: Vec<CoinRule>,
    referrals: Vec<Referral>,
    redemptions: Vec<Redemption>,
    otps: Vec<OtpCode>,
    roles: Vec<Role>,
    admins: Vec<AdminUser>,
    logins: Vec<LoginAttempt>,
    events: Vec<SecurityEvent>,
    scans: Vec<FoodScan>,
    notifications: Vec<Notification>,
}

struct StoredUser {
    user: User,
    deleted: bool,
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn page<T: Clone>(items: impl Iterator<Item = T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl Inner {
    fn live_user(&self, id: Uuid) -> Option<&User> {
        self.users
            .get(&id)
            .filter(|s| !s.deleted)
            .map(|s| &s.user)
    }

    fn insert_user(&mut self, new: NewUser) -> AppResult<User> {
        if self.phone_taken(&new.phone_number, None) {
            return Err(AppError::Conflict("phone number already registered".into()));
        }
        let at = now();
        let user = User {
            id: Uuid::new_v4(),
            phone_number: new.phone_number,
            name: new.name,
            email: new.email,
            coins: 0,
            is_active: true,
            last_login: None,
            created_at: at,
            updated_at: at,
        };
        self.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                deleted: false,
            },
        );
        Ok(user)
    }

    fn phone_taken(&self, phone_number: &str, except: Option<Uuid>) -> bool {
        self.users.values().any(|s| {
            !s.deleted && s.user.phone_number == phone_number && Some(s.user.id) != except
        })
    }

    fn post(&mut self, entries: &[LedgerEntry]) -> AppResult<Vec<CoinTransaction>> {
        let mut balances: HashMap<Uuid, i64> = lock_order(entries)
            .into_iter()
            .filter_map(|id| self.live_user(id).map(|u| (id, u.coins)))
            .collect();
        let planned = plan_postings(&mut balances, entries)?;

        let at = now();
        let mut posted = Vec::with_capacity(planned.len());
        for p in planned {
            let tx = CoinTransaction {
                id: Uuid::new_v4(),
                user_id: p.entry.user_id,
                transaction_type: p.transaction_type,
                amount: p.entry.amount,
                balance_after: p.balance_after,
                description: p.entry.description,
                admin_id: p.entry.admin_id,
                created_at: at,
            };
            self.transactions.push(tx.clone());
            posted.push(tx);
        }
        for (id, balance) in balances {
            if let Some(stored) = self.users.get_mut(&id) {
                stored.user.coins = balance;
                stored.user.updated_at = at;
            }
        }
        Ok(posted)
    }

    fn rule_conflicts(&self, rule: &CoinRule) -> bool {
        self.rules.iter().any(|r| {
            r.id != rule.id && r.rule_type == rule.rule_type && r.action_name == rule.action_name
        })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> AppResult<User> {
        self.inner.lock().await.insert_user(new)
    }

    async fn insert_user_with_balance(
        &self,
        new: NewUser,
        opening: OpeningBalance,
    ) -> AppResult<(User, CoinTransaction)> {
        let mut inner = self.inner.lock().await;
        let user = inner.insert_user(new)?;
        match inner.post(&[opening.entry_for(user.id)]) {
            Ok(posted) => {
                let tx = posted
                    .into_iter()
                    .next()
                    .ok_or_else(|| AppError::Internal(anyhow::anyhow!("opening entry not posted")))?;
                let user = inner.live_user(user.id).cloned().unwrap_or(user);
                Ok((user, tx))
            }
            Err(e) => {
                inner.users.remove(&user.id);
                Err(e)
            }
        }
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.inner.lock().await.live_user(id).cloned())
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> AppResult<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|s| !s.deleted && s.user.phone_number == phone_number)
            .map(|s| s.user.clone()))
    }

    async fn list_users(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let inner = self.inner.lock().await;
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut users: Vec<User> = inner
            .users
            .values()
            .filter(|s| !s.deleted)
            .map(|s| &s.user)
            .filter(|u| match &needle {
                None => true,
                Some(n) => {
                    u.phone_number.to_lowercase().contains(n)
                        || u.name.as_deref().map(|v| v.to_lowercase().contains(n)).unwrap_or(false)
                        || u.email.as_deref().map(|v| v.to_lowercase().contains(n)).unwrap_or(false)
                }
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page(users.into_iter(), query.limit, query.offset))
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> AppResult<Option<User>> {
        let mut inner = self.inner.lock().await;
        if inner.live_user(id).is_none() {
            return Ok(None);
        }
        if let Some(phone) = &patch.phone_number {
            if inner.phone_taken(phone, Some(id)) {
                return Err(AppError::Conflict("phone number already registered".into()));
            }
        }
        let Some(stored) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(phone) = patch.phone_number {
            stored.user.phone_number = phone;
        }
        if let Some(name) = patch.name {
            stored.user.name = Some(name);
        }
        if let Some(email) = patch.email {
            stored.user.email = Some(email);
        }
        stored.user.updated_at = now();
        Ok(Some(stored.user.clone()))
    }

    async fn soft_delete_user(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.users.get_mut(&id) {
            Some(stored) if !stored.deleted => {
                stored.deleted = true;
                stored.user.is_active = false;
                stored.user.updated_at = now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_user_login(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(stored) = inner.users.get_mut(&id) {
            stored.user.last_login = Some(now());
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn post_entries(&self, entries: &[LedgerEntry]) -> AppResult<Vec<CoinTransaction>> {
        self.inner.lock().await.post(entries)
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<CoinTransaction>> {
        let inner = self.inner.lock().await;
        let matching = inner
            .transactions
            .iter()
            .rev()
            .filter(|t| filter.user_id.map(|id| t.user_id == id).unwrap_or(true))
            .filter(|t| {
                filter
                    .transaction_type
                    .map(|ty| t.transaction_type == ty)
                    .unwrap_or(true)
            })
            .filter(|t| !filter.manual_only || t.admin_id.is_some())
            .cloned();
        Ok(page(
            matching,
            filter.limit.unwrap_or(100),
            filter.offset.unwrap_or(0),
        ))
    }

    async fn transaction_stats(
        &self,
        window: &StatsWindow,
        manual_only: bool,
    ) -> AppResult<TransactionStats> {
        let inner = self.inner.lock().await;
        let mut stats = TransactionStats::default();
        for t in inner
            .transactions
            .iter()
            .filter(|t| !manual_only || t.admin_id.is_some())
        {
            stats.total_transactions += 1;
            if t.amount > 0 {
                stats.total_coins_added += t.amount;
            } else {
                stats.total_coins_removed += -t.amount;
            }
            if t.created_at >= window.today {
                stats.transactions_today += 1;
            }
            if t.created_at >= window.week {
                stats.transactions_this_week += 1;
            }
            if t.created_at >= window.month {
                stats.transactions_this_month += 1;
            }
        }
        stats.net_coins = stats.total_coins_added - stats.total_coins_removed;
        Ok(stats)
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn list_rules(&self) -> AppResult<Vec<CoinRule>> {
        let inner = self.inner.lock().await;
        Ok(inner.rules.iter().rev().cloned().collect())
    }

    async fn rules_by_action(&self, action_name: &str) -> AppResult<Vec<CoinRule>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rules
            .iter()
            .filter(|r| r.action_name == action_name)
            .cloned()
            .collect())
    }

    async fn insert_rule(&self, new: NewRule) -> AppResult<CoinRule> {
        let mut inner = self.inner.lock().await;
        let at = now();
        let rule = CoinRule {
            id: Uuid::new_v4(),
            rule_type: new.rule_type,
            action_name: new.action_name,
            coin_amount: new.coin_amount,
            is_active: new.is_active,
            description: new.description,
            conditions: new.conditions,
            created_at: at,
            updated_at: at,
        };
        if inner.rule_conflicts(&rule) {
            return Err(AppError::Conflict(format!(
                "a rule for action `{}` already exists",
                rule.action_name
            )));
        }
        inner.rules.push(rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, id: Uuid, patch: RulePatch) -> AppResult<Option<CoinRule>> {
        let mut inner = self.inner.lock().await;
        let Some(idx) = inner.rules.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let mut rule = inner.rules[idx].clone();
        if let Some(action_name) = patch.action_name {
            rule.action_name = action_name;
        }
        if let Some(coin_amount) = patch.coin_amount {
            rule.coin_amount = coin_amount;
        }
        if let Some(is_active) = patch.is_active {
            rule.is_active = is_active;
        }
        if let Some(description) = patch.description {
            rule.description = Some(description);
        }
        if let Some(conditions) = patch.conditions {
            rule.conditions = conditions;
        }
        if inner.rule_conflicts(&rule) {
            return Err(AppError::Conflict(format!(
                "a rule for action `{}` already exists",
                rule.action_name
            )));
        }
        rule.updated_at = now();
        inner.rules[idx] = rule.clone();
        Ok(Some(rule))
    }

    async fn delete_rule(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.rules.len();
        inner.rules.retain(|r| r.id != id);
        Ok(inner.rules.len() != before)
    }

    async fn toggle_rule(&self, id: Uuid) -> AppResult<Option<CoinRule>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.rules.iter_mut().find(|r| r.id == id).map(|r| {
            r.is_active = !r.is_active;
            r.updated_at = now();
            r.clone()
        }))
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn insert_referral(&self, new: NewReferral) -> AppResult<Referral> {
        let mut inner = self.inner.lock().await;
        if inner.referrals.iter().any(|r| r.code == new.code) {
            return Err(AppError::Conflict("referral code already exists".into()));
        }
        let referral = Referral {
            id: Uuid::new_v4(),
            code: new.code,
            user_id: new.user_id,
            expires_at: new.expires_at,
            is_active: true,
            created_at: now(),
        };
        inner.referrals.push(referral.clone());
        Ok(referral)
    }

    async fn get_referral_by_code(&self, code: &str) -> AppResult<Option<Referral>> {
        let inner = self.inner.lock().await;
        Ok(inner.referrals.iter().find(|r| r.code == code).cloned())
    }

    async fn active_referral_for_owner(&self, user_id: Uuid) -> AppResult<Option<Referral>> {
        let inner = self.inner.lock().await;
        let at = now();
        Ok(inner
            .referrals
            .iter()
            .rev()
            .find(|r| r.user_id == Some(user_id) && r.is_active && !r.is_expired(at))
            .cloned())
    }

    async fn list_referrals(&self, limit: i64, offset: i64) -> AppResult<Vec<ReferralListItem>> {
        let inner = self.inner.lock().await;
        let items = inner.referrals.iter().rev().map(|r| ReferralListItem {
            referral: r.clone(),
            redemptions: inner
                .redemptions
                .iter()
                .filter(|d| d.referral_id == r.id)
                .count() as i64,
        });
        Ok(page(items, limit, offset))
    }

    async fn deactivate_referral(&self, id: Uuid) -> AppResult<Option<Referral>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.referrals.iter_mut().find(|r| r.id == id).map(|r| {
            r.is_active = false;
            r.clone()
        }))
    }

    async fn referral_stats(&self, now: OffsetDateTime) -> AppResult<ReferralStats> {
        let inner = self.inner.lock().await;
        Ok(ReferralStats {
            total_codes: inner.referrals.len() as i64,
            active_codes: inner
                .referrals
                .iter()
                .filter(|r| r.is_active && !r.is_expired(now))
                .count() as i64,
            expired_codes: inner.referrals.iter().filter(|r| r.is_expired(now)).count() as i64,
            total_redemptions: inner.redemptions.len() as i64,
        })
    }

    async fn redeem_referral(
        &self,
        request: &RedemptionRequest,
    ) -> AppResult<(Redemption, Vec<CoinTransaction>)> {
        let mut inner = self.inner.lock().await;
        inner
            .referrals
            .iter()
            .find(|r| r.id == request.referral_id)
            .ok_or(AppError::NotFound("referral code"))?
            .ensure_redeemable(request.now)?;
        if inner.redemptions.iter().any(|d| d.user_id == request.user_id) {
            return Err(AppError::Conflict("a referral code was already redeemed".into()));
        }

        let referrer_live = request
            .referrer_reward
            .as_ref()
            .is_some_and(|e| inner.live_user(e.user_id).is_some());
        let rewards = request.rewards(referrer_live);
        let posted = if rewards.is_empty() {
            Vec::new()
        } else {
            inner.post(&rewards)?
        };
        let redemption = Redemption {
            id: Uuid::new_v4(),
            referral_id: request.referral_id,
            user_id: request.user_id,
            created_at: now(),
        };
        inner.redemptions.push(redemption.clone());
        Ok((redemption, posted))
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn insert_otp(
        &self,
        phone_number: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.otps.push(OtpCode {
            id: Uuid::new_v4(),
            phone_number: phone_number.to_string(),
            code: code.to_string(),
            expires_at,
            verified: false,
            created_at: now(),
        });
        Ok(())
    }

    async fn consume_otp(
        &self,
        phone_number: &str,
        code: &str,
        now: OffsetDateTime,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let found = inner.otps.iter_mut().rev().find(|o| {
            o.phone_number == phone_number && o.code == code && !o.verified && o.expires_at > now
        });
        Ok(match found {
            Some(otp) => {
                otp.verified = true;
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn count_admins(&self) -> AppResult<i64> {
        Ok(self.inner.lock().await.admins.len() as i64)
    }

    async fn insert_role(&self, new: NewRole) -> AppResult<Role> {
        let mut inner = self.inner.lock().await;
        if inner.roles.iter().any(|r| r.role_name == new.role_name) {
            return Err(AppError::Conflict(format!(
                "role `{}` already exists",
                new.role_name
            )));
        }
        let at = now();
        let role = Role {
            id: Uuid::new_v4(),
            role_name: new.role_name,
            description: new.description,
            capabilities: new.capabilities,
            created_at: at,
            updated_at: at,
        };
        inner.roles.push(role.clone());
        Ok(role)
    }

    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.inner.lock().await.roles.iter().rev().cloned().collect())
    }

    async fn get_role(&self, id: Uuid) -> AppResult<Option<Role>> {
        let inner = self.inner.lock().await;
        Ok(inner.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn update_role(&self, id: Uuid, patch: RolePatch) -> AppResult<Option<Role>> {
        let mut inner = self.inner.lock().await;
        if let Some(name) = &patch.role_name {
            if inner.roles.iter().any(|r| r.id != id && &r.role_name == name) {
                return Err(AppError::Conflict(format!("role `{name}` already exists")));
            }
        }
        Ok(inner.roles.iter_mut().find(|r| r.id == id).map(|role| {
            if let Some(name) = patch.role_name {
                role.role_name = name;
            }
            if let Some(description) = patch.description {
                role.description = Some(description);
            }
            if let Some(capabilities) = patch.capabilities {
                role.capabilities = capabilities;
            }
            role.updated_at = now();
            role.clone()
        }))
    }

    async fn delete_role(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.admins.iter().any(|a| a.role_id == id) {
            return Err(AppError::Conflict("role is still assigned to admins".into()));
        }
        let before = inner.roles.len();
        inner.roles.retain(|r| r.id != id);
        Ok(inner.roles.len() != before)
    }

    async fn insert_admin(&self, new: NewAdmin) -> AppResult<AdminUser> {
        let mut inner = self.inner.lock().await;
        if inner.admins.iter().any(|a| a.username == new.username) {
            return Err(AppError::Conflict(format!(
                "username `{}` is taken",
                new.username
            )));
        }
        if !inner.roles.iter().any(|r| r.id == new.role_id) {
            return Err(AppError::NotFound("role"));
        }
        let admin = AdminUser {
            id: Uuid::new_v4(),
            username: new.username,
            password_hash: new.password_hash,
            name: new.name,
            email: new.email,
            role_id: new.role_id,
            is_active: new.is_active,
            last_login: None,
            failed_login_attempts: 0,
            locked_until: None,
            password_changed_at: None,
            created_at: now(),
        };
        inner.admins.push(admin.clone());
        Ok(admin)
    }

    async fn get_admin(&self, id: Uuid) -> AppResult<Option<AdminUser>> {
        let inner = self.inner.lock().await;
        Ok(inner.admins.iter().find(|a| a.id == id).cloned())
    }

    async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<AdminUser>> {
        let inner = self.inner.lock().await;
        Ok(inner.admins.iter().find(|a| a.username == username).cloned())
    }

    async fn list_admins(&self) -> AppResult<Vec<AdminUser>> {
        Ok(self.inner.lock().await.admins.iter().rev().cloned().collect())
    }

    async fn update_admin(&self, id: Uuid, patch: AdminPatch) -> AppResult<Option<AdminUser>> {
        let mut inner = self.inner.lock().await;
        if let Some(role_id) = patch.role_id {
            if !inner.roles.iter().any(|r| r.id == role_id) {
                return Err(AppError::NotFound("role"));
            }
        }
        Ok(inner.admins.iter_mut().find(|a| a.id == id).map(|admin| {
            if let Some(name) = patch.name {
                admin.name = Some(name);
            }
            if let Some(email) = patch.email {
                admin.email = Some(email);
            }
            if let Some(role_id) = patch.role_id {
                admin.role_id = role_id;
            }
            if let Some(is_active) = patch.is_active {
                admin.is_active = is_active;
            }
            if let Some(hash) = patch.password_hash {
                admin.password_hash = hash;
            }
            admin.clone()
        }))
    }

    async fn touch_admin_login(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(admin) = inner.admins.iter_mut().find(|a| a.id == id) {
            admin.last_login = Some(now());
            admin.failed_login_attempts = 0;
            admin.locked_until = None;
        }
        Ok(())
    }

    async fn record_failed_admin_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        locked_until: OffsetDateTime,
    ) -> AppResult<Option<AdminUser>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.admins.iter_mut().find(|a| a.id == id).map(|admin| {
            admin.failed_login_attempts += 1;
            if admin.failed_login_attempts >= max_attempts {
                admin.locked_until = Some(locked_until);
            }
            admin.clone()
        }))
    }

    async fn clear_admin_lockout(&self, id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(admin) = inner.admins.iter_mut().find(|a| a.id == id) {
            admin.failed_login_attempts = 0;
            admin.locked_until = None;
        }
        Ok(())
    }

    async fn set_admin_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.admins.iter_mut().find(|a| a.id == id) {
            Some(admin) => {
                admin.password_hash = password_hash.to_string();
                admin.password_changed_at = Some(now());
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl SecurityStore for MemoryStore {
    async fn insert_login_attempt(&self, new: NewLoginAttempt) -> AppResult<LoginAttempt> {
        let attempt = LoginAttempt {
            id: Uuid::new_v4(),
            username: new.username,
            login_status: new.login_status,
            failure_reason: new.failure_reason,
            ip_address: new.ip_address,
            created_at: now(),
        };
        self.inner.lock().await.logins.push(attempt.clone());
        Ok(attempt)
    }

    async fn list_login_attempts(&self, query: &LoginAttemptQuery) -> AppResult<Vec<LoginAttempt>> {
        let inner = self.inner.lock().await;
        let items = inner
            .logins
            .iter()
            .rev()
            .filter(|l| query.status.map_or(true, |s| l.login_status == s))
            .filter(|l| query.username.as_ref().map_or(true, |u| &l.username == u))
            .cloned();
        Ok(page(items, query.limit, 0))
    }

    async fn login_counts(&self, window: &StatsWindow) -> AppResult<LoginCounts> {
        let inner = self.inner.lock().await;
        let mut counts = LoginCounts {
            total_attempts: inner.logins.len() as i64,
            ..Default::default()
        };
        for l in &inner.logins {
            if l.created_at >= window.today {
                counts.attempts_today += 1;
            }
            if l.created_at >= window.week {
                counts.attempts_this_week += 1;
            }
            match l.login_status {
                LoginStatus::Success => counts.successful_logins += 1,
                LoginStatus::Failed => counts.failed_attempts += 1,
                LoginStatus::Blocked => counts.blocked_attempts += 1,
            }
        }
        Ok(counts)
    }

    async fn insert_security_event(&self, new: NewSecurityEvent) -> AppResult<SecurityEvent> {
        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: new.event_type,
            severity: new.event_type.severity(),
            username: new.username,
            admin_id: new.admin_id,
            ip_address: new.ip_address,
            details: new.details,
            created_at: now(),
        };
        self.inner.lock().await.events.push(event.clone());
        Ok(event)
    }

    async fn list_security_events(
        &self,
        query: &SecurityEventQuery,
    ) -> AppResult<Vec<SecurityEvent>> {
        let inner = self.inner.lock().await;
        let items = inner
            .events
            .iter()
            .rev()
            .filter(|e| query.event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| query.severity.map_or(true, |s| e.severity == s))
            .filter(|e| query.admin_id.map_or(true, |id| e.admin_id == Some(id)))
            .cloned();
        Ok(page(items, query.limit, 0))
    }

    async fn security_event_stats(&self, window: &StatsWindow) -> AppResult<SecurityEventStats> {
        let inner = self.inner.lock().await;
        let mut stats = SecurityEventStats {
            total_events: inner.events.len() as i64,
            ..Default::default()
        };
        for e in &inner.events {
            if e.created_at >= window.today {
                stats.events_today += 1;
            }
            if e.created_at >= window.week {
                stats.events_this_week += 1;
            }
            *stats.by_severity.entry(e.severity).or_default() += 1;
            *stats.by_type.entry(e.event_type).or_default() += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn record_scan(
        &self,
        new: NewScan,
        reward: Option<LedgerEntry>,
    ) -> AppResult<(FoodScan, Option<CoinTransaction>)> {
        let mut inner = self.inner.lock().await;
        if inner.live_user(new.user_id).is_none() {
            return Err(AppError::NotFound("user"));
        }
        // post first; a refused reward must leave no scan behind
        let posted = match reward {
            Some(entry) => inner.post(&[entry])?.into_iter().next(),
            None => None,
        };
        let scan = FoodScan {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            food_name: new.food_name,
            confidence: new.confidence,
            image_path: new.image_path,
            nutrition: new.nutrition,
            created_at: now(),
        };
        inner.scans.push(scan.clone());
        Ok((scan, posted))
    }

    async fn recent_scans(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<FoodScan>> {
        let inner = self.inner.lock().await;
        let items = inner
            .scans
            .iter()
            .rev()
            .filter(|s| s.user_id == user_id)
            .cloned();
        Ok(page(items, limit, 0))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, new: NewNotification) -> AppResult<Notification> {
        let mut inner = self.inner.lock().await;
        if inner.live_user(new.user_id).is_none() {
            return Err(AppError::NotFound("user"));
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            message: new.message,
            notification_type: new.notification_type,
            extra_data: new.extra_data,
            is_read: false,
            created_at: now(),
        };
        inner.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Notification>> {
        let inner = self.inner.lock().await;
        let items = inner
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .cloned();
        Ok(page(items, limit, 0))
    }

    async fn get_notification(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Notification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .find(|n| n.id == id && n.user_id == user_id)
            .cloned())
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Notification>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }
}
