use rand::Rng;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    claims::Scope,
    jwt::{JwtKeys, TokenPair},
    password,
};
use crate::{
    admin::repo_types::AdminUser,
    error::{AppError, AppResult},
    security::{
        repo_types::{LoginStatus, SecurityEventType},
        services as security,
    },
    state::AppState,
    users::{
        repo_types::{NewUser, User},
        services::normalize_phone,
    },
};

/// Outcome of a send-otp call. `code` is only populated when echoing is
/// enabled for development.
#[derive(Debug, Clone)]
pub struct OtpIssued {
    pub phone_number: String,
    pub expires_at: OffsetDateTime,
    pub code: Option<String>,
}

pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length.max(1))
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub async fn send_otp(state: &AppState, phone: &str) -> AppResult<OtpIssued> {
    let phone_number =
        normalize_phone(phone).ok_or_else(|| AppError::validation("invalid phone number"))?;
    let otp = &state.config.otp;
    let code = generate_otp(otp.code_length);
    let expires_at = OffsetDateTime::now_utc() + Duration::minutes(otp.ttl_minutes.max(1));

    state
        .store
        .insert_otp(&phone_number, &code, expires_at)
        .await?;

    // mock SMS delivery
    info!(phone = %phone_number, code = %code, "otp sent");

    Ok(OtpIssued {
        phone_number,
        expires_at,
        code: otp.echo_code.then_some(code),
    })
}

/// Consumes the code, gets or creates the user and issues a user-scoped pair.
/// Returns `true` as the last element when the user was created.
pub async fn verify_otp(
    state: &AppState,
    phone: &str,
    code: &str,
) -> AppResult<(User, TokenPair, bool)> {
    let phone_number =
        normalize_phone(phone).ok_or_else(|| AppError::validation("invalid phone number"))?;
    let code = code.trim();

    let ok = state
        .store
        .consume_otp(&phone_number, code, OffsetDateTime::now_utc())
        .await?;
    if !ok {
        warn!(phone = %phone_number, "invalid or expired otp");
        return Err(AppError::Unauthorized("invalid or expired code".into()));
    }

    let (user, created) = match state.store.find_user_by_phone(&phone_number).await? {
        Some(user) => (user, false),
        None => {
            let user = state
                .store
                .insert_user(NewUser {
                    phone_number: phone_number.clone(),
                    name: None,
                    email: None,
                })
                .await?;
            info!(user_id = %user.id, "user registered via otp");
            (user, true)
        }
    };
    if !user.is_active {
        warn!(user_id = %user.id, "login attempt by inactive user");
        return Err(AppError::Unauthorized("account is disabled".into()));
    }
    state.store.touch_user_login(user.id).await?;

    let tokens = JwtKeys::from(&state.config.jwt).issue_pair(user.id, Scope::User)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, tokens, created))
}

/// Exchanges a refresh token for a new pair for the same principal.
pub async fn refresh(state: &AppState, refresh_token: &str) -> AppResult<TokenPair> {
    let keys = JwtKeys::from(&state.config.jwt);
    let claims = keys
        .verify_refresh(refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    // the principal must still exist and be enabled
    let active = match claims.scope {
        Scope::User => state
            .store
            .get_user(claims.sub)
            .await?
            .is_some_and(|u| u.is_active),
        Scope::Admin => state
            .store
            .get_admin(claims.sub)
            .await?
            .is_some_and(|a| a.is_active),
    };
    if !active {
        return Err(AppError::Unauthorized("account not found or disabled".into()));
    }

    Ok(keys.issue_pair(claims.sub, claims.scope)?)
}

/// Password login for the admin panel. Every outcome lands in the login
/// history; repeated failures lock the account for a while.
pub async fn admin_login(
    state: &AppState,
    username: &str,
    password: &str,
    ip: &str,
) -> AppResult<(AdminUser, TokenPair)> {
    let username = username.trim();
    let invalid = || AppError::Unauthorized("invalid credentials".into());

    let Some(admin) = state.store.find_admin_by_username(username).await? else {
        warn!(%username, "admin login unknown username");
        reject_login(state, username, None, ip, "Invalid username").await;
        return Err(invalid());
    };

    let now = OffsetDateTime::now_utc();
    if admin.is_locked(now) {
        warn!(%username, admin_id = %admin.id, "admin login while locked");
        security::log_login_attempt(state, username, LoginStatus::Blocked, Some("Account locked"), ip)
            .await;
        return Err(AppError::AccountLocked);
    }
    if admin.locked_until.is_some() {
        // the lock ran out; start counting afresh
        state.store.clear_admin_lockout(admin.id).await?;
    }
    if !admin.is_active {
        warn!(%username, admin_id = %admin.id, "admin login while disabled");
        security::log_login_attempt(state, username, LoginStatus::Failed, Some("Account inactive"), ip)
            .await;
        return Err(AppError::Unauthorized("account is disabled".into()));
    }

    if !password::verify(password, &admin.password_hash)? {
        warn!(%username, admin_id = %admin.id, "admin login invalid password");
        let limits = &state.config.security;
        let lock_until = now + Duration::minutes(limits.lockout_minutes.max(1));
        let updated = state
            .store
            .record_failed_admin_login(admin.id, limits.max_failed_logins.max(1), lock_until)
            .await?;
        if let Some(locked) = updated.filter(|a| a.is_locked(now)) {
            security::log_event(
                state,
                SecurityEventType::AccountLocked,
                username,
                Some(admin.id),
                ip,
                json!({
                    "reason": "Max login attempts exceeded",
                    "attempts": locked.failed_login_attempts,
                }),
            )
            .await;
        }
        reject_login(state, username, Some(admin.id), ip, "Invalid password").await;
        return Err(invalid());
    }

    state.store.touch_admin_login(admin.id).await?;
    let tokens = JwtKeys::from(&state.config.jwt).issue_pair(admin.id, Scope::Admin)?;

    security::log_login_attempt(state, username, LoginStatus::Success, None, ip).await;
    security::log_event(
        state,
        SecurityEventType::LoginSuccess,
        username,
        Some(admin.id),
        ip,
        json!({}),
    )
    .await;
    info!(admin_id = %admin.id, %username, "admin logged in");
    Ok((admin, tokens))
}

async fn reject_login(
    state: &AppState,
    username: &str,
    admin_id: Option<Uuid>,
    ip: &str,
    reason: &str,
) {
    security::log_login_attempt(state, username, LoginStatus::Failed, Some(reason), ip).await;
    security::log_event(
        state,
        SecurityEventType::LoginFailed,
        username,
        admin_id,
        ip,
        json!({ "reason": reason }),
    )
    .await;
}

/// The signed-in admin replaces their own password.
pub async fn change_admin_password(
    state: &AppState,
    admin_id: Uuid,
    current_password: &str,
    new_password: &str,
    ip: &str,
) -> AppResult<()> {
    let admin = state
        .store
        .get_admin(admin_id)
        .await?
        .ok_or(AppError::NotFound("admin"))?;
    if !password::verify(current_password, &admin.password_hash)? {
        warn!(%admin_id, "password change with wrong current password");
        return Err(AppError::Unauthorized("current password is incorrect".into()));
    }
    if current_password == new_password {
        return Err(AppError::validation("new password must differ from the current one"));
    }
    let hash = password::validate_and_hash(new_password)?;
    if !state.store.set_admin_password(admin_id, &hash).await? {
        return Err(AppError::NotFound("admin"));
    }

    security::log_event(
        state,
        SecurityEventType::PasswordChange,
        &admin.username,
        Some(admin_id),
        ip,
        json!({}),
    )
    .await;
    info!(%admin_id, "admin password changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admin::{capability::CapabilitySet, repo_types::{NewAdmin, NewRole}},
        security::services::UNKNOWN_IP,
    };

    const IP: &str = "198.51.100.4";

    #[test]
    fn generated_otp_is_numeric_with_requested_length() {
        for len in [4, 6, 8] {
            let code = generate_otp(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn otp_round_trip_creates_user_once() {
        let state = AppState::fake();
        let sent = send_otp(&state, "+1 (555) 010-2000").await.unwrap();
        assert_eq!(sent.phone_number, "+15550102000");
        let code = sent.code.expect("echo enabled in tests");

        let (user, tokens, created) = verify_otp(&state, "+15550102000", &code).await.unwrap();
        assert!(created);
        let claims = JwtKeys::from(&state.config.jwt)
            .verify_access(&tokens.access_token, Scope::User)
            .unwrap();
        assert_eq!(claims.sub, user.id);

        // same code cannot be used twice
        let err = verify_otp(&state, "+15550102000", &code).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let code = send_otp(&state, "+15550102000").await.unwrap().code.unwrap();
        let (again, _, created) = verify_otp(&state, "+15550102000", &code).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);
        let stored = state.store.get_user(user.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn otp_rejects_bad_phone_and_wrong_code() {
        let state = AppState::fake();
        let err = send_otp(&state, "12ab").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        send_otp(&state, "+15550102001").await.unwrap();
        let err = verify_otp(&state, "+15550102001", "not-it").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(state
            .store
            .find_user_by_phone("+15550102001")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn otp_is_not_echoed_when_disabled() {
        let mut config = crate::config::AppConfig::for_tests();
        config.otp.echo_code = false;
        let state = AppState::from_parts(
            std::sync::Arc::new(crate::store::memory::MemoryStore::new()),
            std::sync::Arc::new(config),
        );
        let sent = send_otp(&state, "+15550102002").await.unwrap();
        assert!(sent.code.is_none());
    }

    async fn seed_admin(state: &AppState, username: &str, password: &str, active: bool) -> AdminUser {
        let role = state
            .store
            .insert_role(NewRole {
                role_name: format!("role_{username}"),
                description: None,
                capabilities: CapabilitySet::all(),
            })
            .await
            .unwrap();
        state
            .store
            .insert_admin(NewAdmin {
                username: username.into(),
                password_hash: password::validate_and_hash(password).unwrap(),
                name: None,
                email: None,
                role_id: role.id,
                is_active: active,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn admin_login_checks_password_and_status() {
        let state = AppState::fake();
        let admin = seed_admin(&state, "root", "s3cret-pass", true).await;
        seed_admin(&state, "retired", "s3cret-pass", false).await;

        let (logged_in, tokens) = admin_login(&state, "root", "s3cret-pass", IP).await.unwrap();
        assert_eq!(logged_in.id, admin.id);
        let keys = JwtKeys::from(&state.config.jwt);
        assert!(keys.verify_access(&tokens.access_token, Scope::Admin).is_ok());

        for (user, pass) in [("root", "wrong-pass"), ("nobody", "s3cret-pass"), ("retired", "s3cret-pass")] {
            let err = admin_login(&state, user, pass, UNKNOWN_IP).await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let state = AppState::fake();
        let admin = seed_admin(&state, "target", "s3cret-pass", true).await;
        let max = state.config.security.max_failed_logins;

        for _ in 0..max {
            let err = admin_login(&state, "target", "guess-pass", IP).await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
        let stored = state.store.get_admin(admin.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, max);
        assert!(stored.is_locked(OffsetDateTime::now_utc()));

        // the right password no longer helps while locked
        let err = admin_login(&state, "target", "s3cret-pass", IP).await.unwrap_err();
        assert!(matches!(err, AppError::AccountLocked));

        let blocked = security::login_history(&state, Some(LoginStatus::Blocked), None, None)
            .await
            .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].ip_address, IP);
        let locks = security::list_events(
            &state,
            Some(SecurityEventType::AccountLocked),
            None,
            Some(admin.id),
            None,
        )
        .await
        .unwrap();
        assert_eq!(locks.len(), 1);
        assert_eq!(locks[0].details["attempts"], max);
    }

    #[tokio::test]
    async fn expired_lock_is_cleared_and_success_resets_counter() {
        let state = AppState::fake();
        let admin = seed_admin(&state, "sleepy", "s3cret-pass", true).await;
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        state
            .store
            .record_failed_admin_login(admin.id, 1, past)
            .await
            .unwrap();

        admin_login(&state, "sleepy", "s3cret-pass", IP).await.unwrap();
        let stored = state.store.get_admin(admin.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
        assert!(stored.last_login.is_some());

        let stats = security::login_stats(&state).await.unwrap();
        assert_eq!(stats.counts.successful_logins, 1);
        assert_eq!(stats.success_rate, 100.0);
    }

    #[tokio::test]
    async fn change_password_requires_current_one() {
        let state = AppState::fake();
        let admin = seed_admin(&state, "rotator", "s3cret-pass", true).await;

        let err = change_admin_password(&state, admin.id, "wrong-pass", "n3w-passw0rd", IP)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = change_admin_password(&state, admin.id, "s3cret-pass", "short", IP)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        change_admin_password(&state, admin.id, "s3cret-pass", "n3w-passw0rd", IP)
            .await
            .unwrap();
        assert!(admin_login(&state, "rotator", "s3cret-pass", IP).await.is_err());
        admin_login(&state, "rotator", "n3w-passw0rd", IP).await.unwrap();

        let stored = state.store.get_admin(admin.id).await.unwrap().unwrap();
        assert!(stored.password_changed_at.is_some());
        let changes = security::list_events(
            &state,
            Some(SecurityEventType::PasswordChange),
            None,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].username, "rotator");
    }

    #[tokio::test]
    async fn refresh_keeps_scope_and_rejects_access_tokens() {
        let state = AppState::fake();
        let admin = seed_admin(&state, "ops", "s3cret-pass", true).await;
        let (_, tokens) = admin_login(&state, "ops", "s3cret-pass", IP).await.unwrap();

        let pair = refresh(&state, &tokens.refresh_token).await.unwrap();
        let claims = JwtKeys::from(&state.config.jwt)
            .verify_access(&pair.access_token, Scope::Admin)
            .unwrap();
        assert_eq!(claims.sub, admin.id);

        let err = refresh(&state, &tokens.access_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
