use lazy_static::lazy_static;
use regex::Regex;
use tracing::info;
use uuid::Uuid;

use super::repo_types::{NewUser, OpeningBalance, User, UserPatch, UserQuery};
use crate::{
    error::{AppError, AppResult},
    ledger::services::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT},
    state::AppState,
};

const MAX_NAME_LEN: usize = 100;

/// Canonical `+<digits>` form of a phone number, or `None` when it is not
/// 7 to 15 digits once spaces, dashes and parentheses are removed.
pub fn normalize_phone(raw: &str) -> Option<String> {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]{7,15}$").unwrap();
    }
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if !PHONE_RE.is_match(&compact) {
        return None;
    }
    Some(format!("+{}", compact.trim_start_matches('+')))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn clean_name(name: Option<String>) -> AppResult<Option<String>> {
    let Some(name) = name else { return Ok(None) };
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(Some(name.to_string()))
}

fn clean_email(email: Option<String>) -> AppResult<Option<String>> {
    let Some(email) = email else { return Ok(None) };
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::validation("invalid email"));
    }
    Ok(Some(email))
}

fn clean_phone(phone: Option<String>) -> AppResult<Option<String>> {
    phone
        .map(|p| normalize_phone(&p).ok_or_else(|| AppError::validation("invalid phone number")))
        .transpose()
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub phone_number: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub initial_coins: i64,
}

/// Creates a user on behalf of an admin. A positive opening balance is
/// posted as a manual adjustment by that admin.
pub async fn create_user(state: &AppState, admin_id: Uuid, input: CreateUser) -> AppResult<User> {
    if input.initial_coins < 0 {
        return Err(AppError::validation("initial_coins must not be negative"));
    }
    let new = NewUser {
        phone_number: clean_phone(Some(input.phone_number))?
            .ok_or_else(|| AppError::validation("phone number is required"))?,
        name: clean_name(input.name)?,
        email: clean_email(input.email)?,
    };

    if input.initial_coins == 0 {
        let user = state.store.insert_user(new).await?;
        info!(user_id = %user.id, %admin_id, "user created");
        return Ok(user);
    }

    let opening = OpeningBalance {
        amount: input.initial_coins,
        description: "Opening balance".into(),
        admin_id: Some(admin_id),
    };
    let (user, tx) = state.store.insert_user_with_balance(new, opening).await?;
    info!(
        user_id = %user.id,
        %admin_id,
        amount = tx.amount,
        tx_id = %tx.id,
        "user created with opening balance"
    );
    Ok(user)
}

pub async fn get_user(state: &AppState, id: Uuid) -> AppResult<User> {
    state
        .store
        .get_user(id)
        .await?
        .ok_or(AppError::NotFound("user"))
}

pub async fn list_users(
    state: &AppState,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<User>> {
    let query = UserQuery {
        search: search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        limit: limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
        offset: offset.unwrap_or(0).max(0),
    };
    state.store.list_users(&query).await
}

pub async fn update_user(state: &AppState, id: Uuid, patch: UserPatch) -> AppResult<User> {
    if patch.is_empty() {
        return Err(AppError::validation("nothing to update"));
    }
    let patch = UserPatch {
        phone_number: clean_phone(patch.phone_number)?,
        name: clean_name(patch.name)?,
        email: clean_email(patch.email)?,
    };
    let user = state
        .store
        .update_user(id, patch)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    info!(user_id = %user.id, "user updated");
    Ok(user)
}

/// Self-service profile edit; the phone number is the login identity and
/// stays fixed here.
pub async fn update_me(
    state: &AppState,
    user_id: Uuid,
    name: Option<String>,
    email: Option<String>,
) -> AppResult<User> {
    update_user(
        state,
        user_id,
        UserPatch {
            phone_number: None,
            name,
            email,
        },
    )
    .await
}

pub async fn delete_user(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.store.soft_delete_user(id).await? {
        return Err(AppError::NotFound("user"));
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::repo_types::TransactionFilter;

    fn input(phone: &str, coins: i64) -> CreateUser {
        CreateUser {
            phone_number: phone.into(),
            name: Some("  Ada  ".into()),
            email: Some("Ada@Example.com".into()),
            initial_coins: coins,
        }
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone("5551234").as_deref(), Some("+5551234"));
        assert!(normalize_phone("123456").is_none());
        assert!(normalize_phone("+1234567890123456").is_none());
        assert!(normalize_phone("+1555abc4567").is_none());
        assert!(normalize_phone("++15551234567").is_none());
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user example@x.io"));
    }

    #[tokio::test]
    async fn create_with_opening_balance_goes_through_ledger() {
        let state = AppState::fake();
        let admin = Uuid::new_v4();
        let user = create_user(&state, admin, input("+44 20 7946 0000", 120)).await.unwrap();

        assert_eq!(user.coins, 120);
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(user.phone_number, "+442079460000");

        let txs = state
            .ledger
            .transactions(TransactionFilter {
                user_id: Some(user.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].admin_id, Some(admin));
        assert_eq!(txs[0].balance_after, 120);
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_bad_input() {
        let state = AppState::fake();
        let admin = Uuid::new_v4();
        create_user(&state, admin, input("+15550100000", 0)).await.unwrap();

        let dup = create_user(&state, admin, input("+1 555 010 0000", 0)).await.unwrap_err();
        assert!(matches!(dup, AppError::Conflict(_)));

        let negative = create_user(&state, admin, input("+15550100001", -5)).await.unwrap_err();
        assert!(matches!(negative, AppError::Validation(_)));

        let mut bad_email = input("+15550100002", 0);
        bad_email.email = Some("nope".into());
        assert!(matches!(
            create_user(&state, admin, bad_email).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn failed_opening_posting_leaves_no_user() {
        let state = AppState::fake();
        let new = NewUser {
            phone_number: "+15550100020".into(),
            name: None,
            email: None,
        };
        let rejected = OpeningBalance {
            amount: 0,
            description: "Opening balance".into(),
            admin_id: None,
        };
        assert!(state
            .store
            .insert_user_with_balance(new, rejected)
            .await
            .is_err());
        assert!(state
            .store
            .find_user_by_phone("+15550100020")
            .await
            .unwrap()
            .is_none());
        assert!(state.ledger.transactions(TransactionFilter::default()).await.unwrap().is_empty());

        let user = create_user(&state, Uuid::new_v4(), input("+15550100020", 40)).await.unwrap();
        assert_eq!(get_user(&state, user.id).await.unwrap().coins, 40);
    }

    #[tokio::test]
    async fn soft_delete_hides_user_and_frees_phone() {
        let state = AppState::fake();
        let admin = Uuid::new_v4();
        let user = create_user(&state, admin, input("+15550100010", 30)).await.unwrap();

        delete_user(&state, user.id).await.unwrap();
        assert!(matches!(get_user(&state, user.id).await.unwrap_err(), AppError::NotFound(_)));
        assert!(matches!(delete_user(&state, user.id).await.unwrap_err(), AppError::NotFound(_)));

        // ledger history is preserved
        let txs = state
            .store
            .list_transactions(&TransactionFilter {
                user_id: Some(user.id),
                limit: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);

        let again = create_user(&state, admin, input("+15550100010", 0)).await.unwrap();
        assert_ne!(again.id, user.id);
        assert_eq!(again.coins, 0);
    }

    #[tokio::test]
    async fn update_validates_and_never_touches_coins() {
        let state = AppState::fake();
        let user = create_user(&state, Uuid::new_v4(), input("+15550100020", 15)).await.unwrap();

        let err = update_user(&state, user.id, UserPatch::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let updated = update_me(&state, user.id, Some("Grace".into()), None).await.unwrap();
        assert_eq!(updated.name.as_deref(), Some("Grace"));
        assert_eq!(updated.coins, 15);
        assert_eq!(updated.phone_number, "+15550100020");

        let missing = update_me(&state, Uuid::new_v4(), Some("X".into()), None).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_searches_case_insensitively() {
        let state = AppState::fake();
        let admin = Uuid::new_v4();
        create_user(&state, admin, input("+15550100030", 0)).await.unwrap();
        let mut other = input("+15550100031", 0);
        other.name = Some("Linus".into());
        other.email = None;
        create_user(&state, admin, other).await.unwrap();

        let found = list_users(&state, Some("LINUS".into()), None, None).await.unwrap();
        assert_eq!(found.len(), 1);
        let all = list_users(&state, Some("   ".into()), Some(0), None).await.unwrap();
        // limit is clamped to at least one
        assert_eq!(all.len(), 1);
        let all = list_users(&state, None, None, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
