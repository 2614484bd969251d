//! Persistence seam. Every domain talks to storage through these traits;
//! [`PgStore`] backs them with PostgreSQL and [`memory::MemoryStore`] keeps
//! everything in process for development and tests.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    admin::repo_types::{AdminPatch, AdminUser, NewAdmin, NewRole, Role, RolePatch},
    error::AppResult,
    ledger::repo_types::{
        CoinTransaction, LedgerEntry, StatsWindow, TransactionFilter, TransactionStats,
    },
    notifications::repo_types::{NewNotification, Notification},
    referrals::repo_types::{
        NewReferral, Redemption, RedemptionRequest, Referral, ReferralListItem, ReferralStats,
    },
    rules::repo_types::{CoinRule, NewRule, RulePatch},
    scans::repo_types::{FoodScan, NewScan},
    security::repo_types::{
        LoginAttempt, LoginAttemptQuery, LoginCounts, NewLoginAttempt, NewSecurityEvent,
        SecurityEvent, SecurityEventQuery, SecurityEventStats,
    },
    users::repo_types::{NewUser, OpeningBalance, User, UserPatch, UserQuery},
};

pub mod memory;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when a live user already owns the phone number.
    async fn insert_user(&self, new: NewUser) -> AppResult<User>;
    /// Creates the user and posts the opening entry atomically. When the
    /// posting fails no user is left behind.
    async fn insert_user_with_balance(
        &self,
        new: NewUser,
        opening: OpeningBalance,
    ) -> AppResult<(User, CoinTransaction)>;
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_user_by_phone(&self, phone_number: &str) -> AppResult<Option<User>>;
    async fn list_users(&self, query: &UserQuery) -> AppResult<Vec<User>>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> AppResult<Option<User>>;
    /// Returns `false` when there was no live user to delete.
    async fn soft_delete_user(&self, id: Uuid) -> AppResult<bool>;
    async fn touch_user_login(&self, id: Uuid) -> AppResult<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomically applies every entry or none of them.
    async fn post_entries(&self, entries: &[LedgerEntry]) -> AppResult<Vec<CoinTransaction>>;
    /// Newest first. `limit` and `offset` are expected to be clamped already.
    async fn list_transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<CoinTransaction>>;
    async fn transaction_stats(
        &self,
        window: &StatsWindow,
        manual_only: bool,
    ) -> AppResult<TransactionStats>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_rules(&self) -> AppResult<Vec<CoinRule>>;
    async fn rules_by_action(&self, action_name: &str) -> AppResult<Vec<CoinRule>>;
    async fn insert_rule(&self, new: NewRule) -> AppResult<CoinRule>;
    async fn update_rule(&self, id: Uuid, patch: RulePatch) -> AppResult<Option<CoinRule>>;
    async fn delete_rule(&self, id: Uuid) -> AppResult<bool>;
    /// Flips `is_active` and returns the updated rule.
    async fn toggle_rule(&self, id: Uuid) -> AppResult<Option<CoinRule>>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn insert_referral(&self, new: NewReferral) -> AppResult<Referral>;
    async fn get_referral_by_code(&self, code: &str) -> AppResult<Option<Referral>>;
    async fn active_referral_for_owner(&self, user_id: Uuid) -> AppResult<Option<Referral>>;
    async fn list_referrals(&self, limit: i64, offset: i64) -> AppResult<Vec<ReferralListItem>>;
    async fn deactivate_referral(&self, id: Uuid) -> AppResult<Option<Referral>>;
    async fn referral_stats(&self, now: OffsetDateTime) -> AppResult<ReferralStats>;
    /// Records the redemption and posts the rewards in one atomic step.
    /// Fails with `Validation` when the code is inactive or expired at that
    /// point and with `Conflict` when the user has already redeemed a code.
    async fn redeem_referral(
        &self,
        request: &RedemptionRequest,
    ) -> AppResult<(Redemption, Vec<CoinTransaction>)>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert_otp(
        &self,
        phone_number: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> AppResult<()>;
    /// Marks the newest matching unverified, unexpired code as verified.
    async fn consume_otp(&self, phone_number: &str, code: &str, now: OffsetDateTime)
        -> AppResult<bool>;
}

#[async_trait]
pub trait AdminStore: Send + Sync {
    async fn count_admins(&self) -> AppResult<i64>;
    async fn insert_role(&self, new: NewRole) -> AppResult<Role>;
    async fn list_roles(&self) -> AppResult<Vec<Role>>;
    async fn get_role(&self, id: Uuid) -> AppResult<Option<Role>>;
    async fn update_role(&self, id: Uuid, patch: RolePatch) -> AppResult<Option<Role>>;
    /// Fails with `Conflict` while admins are still assigned to the role.
    async fn delete_role(&self, id: Uuid) -> AppResult<bool>;
    async fn insert_admin(&self, new: NewAdmin) -> AppResult<AdminUser>;
    async fn get_admin(&self, id: Uuid) -> AppResult<Option<AdminUser>>;
    async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<AdminUser>>;
    async fn list_admins(&self) -> AppResult<Vec<AdminUser>>;
    async fn update_admin(&self, id: Uuid, patch: AdminPatch) -> AppResult<Option<AdminUser>>;
    /// Records the login and clears any failed-attempt count or lock.
    async fn touch_admin_login(&self, id: Uuid) -> AppResult<()>;
    /// Bumps the failed-attempt counter and sets `locked_until` once it
    /// reaches `max_attempts`. Returns the updated account.
    async fn record_failed_admin_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        locked_until: OffsetDateTime,
    ) -> AppResult<Option<AdminUser>>;
    async fn clear_admin_lockout(&self, id: Uuid) -> AppResult<()>;
    /// Replaces the hash and stamps `password_changed_at`.
    async fn set_admin_password(&self, id: Uuid, password_hash: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait SecurityStore: Send + Sync {
    async fn insert_login_attempt(&self, new: NewLoginAttempt) -> AppResult<LoginAttempt>;
    async fn list_login_attempts(&self, query: &LoginAttemptQuery) -> AppResult<Vec<LoginAttempt>>;
    async fn login_counts(&self, window: &StatsWindow) -> AppResult<LoginCounts>;
    async fn insert_security_event(&self, new: NewSecurityEvent) -> AppResult<SecurityEvent>;
    async fn list_security_events(&self, query: &SecurityEventQuery)
        -> AppResult<Vec<SecurityEvent>>;
    async fn security_event_stats(&self, window: &StatsWindow) -> AppResult<SecurityEventStats>;
}

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Stores the scan and posts `reward`, if any, in one atomic step.
    async fn record_scan(
        &self,
        new: NewScan,
        reward: Option<LedgerEntry>,
    ) -> AppResult<(FoodScan, Option<CoinTransaction>)>;
    async fn recent_scans(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<FoodScan>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, new: NewNotification) -> AppResult<Notification>;
    async fn list_notifications(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Notification>>;
    /// Lookups and updates are scoped to the owning user.
    async fn get_notification(&self, id: Uuid, user_id: Uuid) -> AppResult<Option<Notification>>;
    async fn mark_notification_read(&self, id: Uuid, user_id: Uuid)
        -> AppResult<Option<Notification>>;
    async fn unread_count(&self, user_id: Uuid) -> AppResult<i64>;
}

pub trait Store:
    UserStore
    + LedgerStore
    + RuleStore
    + ReferralStore
    + OtpStore
    + AdminStore
    + SecurityStore
    + ScanStore
    + NotificationStore
{
}

impl<T> Store for T where
    T: UserStore
        + LedgerStore
        + RuleStore
        + ReferralStore
        + OtpStore
        + AdminStore
        + SecurityStore
        + ScanStore
        + NotificationStore
{
}

/// PostgreSQL-backed store. The trait impls live next to each domain in
/// its `repo.rs`.
#[derive(Clone)]
pub struct PgStore {
    pub(crate) db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        Ok(Self { db })
    }
}
