use tracing::{info, warn};
use uuid::Uuid;

use super::{
    capability::CapabilitySet,
    repo_types::{AdminPatch, AdminUser, NewAdmin, NewRole, Role, RolePatch},
};
use crate::{
    auth::password::validate_and_hash,
    config::BootstrapAdmin,
    error::{AppError, AppResult},
    state::AppState,
    users::services::is_valid_email,
};

pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Creates the `super_admin` role and a first admin account when the store
/// has no admins yet. Returns the created admin, if any.
pub async fn bootstrap(state: &AppState) -> anyhow::Result<Option<AdminUser>> {
    let Some(BootstrapAdmin { username, password }) = state.config.bootstrap_admin.clone() else {
        return Ok(None);
    };
    if state.store.count_admins().await? > 0 {
        return Ok(None);
    }

    let role = match state
        .store
        .list_roles()
        .await?
        .into_iter()
        .find(|r| r.role_name == SUPER_ADMIN_ROLE)
    {
        Some(role) => role,
        None => {
            state
                .store
                .insert_role(NewRole {
                    role_name: SUPER_ADMIN_ROLE.into(),
                    description: Some("Full access".into()),
                    capabilities: CapabilitySet::all(),
                })
                .await?
        }
    };

    let admin = create_admin(
        state,
        CreateAdmin {
            username,
            password,
            name: None,
            email: None,
            role_id: role.id,
            is_active: true,
        },
    )
    .await?;
    warn!(admin_id = %admin.id, username = %admin.username, "bootstrap admin created");
    Ok(Some(admin))
}

fn clean_role_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(AppError::validation("role_name must be 1-64 characters"));
    }
    Ok(name.to_string())
}

fn clean_email(email: Option<String>) -> AppResult<Option<String>> {
    match email.map(|e| e.trim().to_lowercase()) {
        Some(e) if !is_valid_email(&e) => Err(AppError::validation("invalid email")),
        other => Ok(other),
    }
}

async fn ensure_role(state: &AppState, role_id: Uuid) -> AppResult<()> {
    state
        .store
        .get_role(role_id)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound("role"))
}

pub async fn list_roles(state: &AppState) -> AppResult<Vec<Role>> {
    state.store.list_roles().await
}

pub async fn create_role(state: &AppState, mut new: NewRole) -> AppResult<Role> {
    new.role_name = clean_role_name(&new.role_name)?;
    let role = state.store.insert_role(new).await?;
    info!(role_id = %role.id, role = %role.role_name, "role created");
    Ok(role)
}

pub async fn update_role(state: &AppState, id: Uuid, mut patch: RolePatch) -> AppResult<Role> {
    if patch.role_name.is_none() && patch.description.is_none() && patch.capabilities.is_none() {
        return Err(AppError::validation("nothing to update"));
    }
    if let Some(name) = patch.role_name.take() {
        patch.role_name = Some(clean_role_name(&name)?);
    }
    let role = state
        .store
        .update_role(id, patch)
        .await?
        .ok_or(AppError::NotFound("role"))?;
    info!(role_id = %role.id, "role updated");
    Ok(role)
}

pub async fn delete_role(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.store.delete_role(id).await? {
        return Err(AppError::NotFound("role"));
    }
    info!(role_id = %id, "role deleted");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CreateAdmin {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role_id: Uuid,
    pub is_active: bool,
}

pub async fn list_admins(state: &AppState) -> AppResult<Vec<AdminUser>> {
    state.store.list_admins().await
}

pub async fn create_admin(state: &AppState, input: CreateAdmin) -> AppResult<AdminUser> {
    let username = input.username.trim().to_string();
    if username.len() < 3 || username.len() > 64 {
        return Err(AppError::validation("username must be 3-64 characters"));
    }
    let email = clean_email(input.email)?;
    ensure_role(state, input.role_id).await?;
    let password_hash = validate_and_hash(&input.password)?;

    let admin = state
        .store
        .insert_admin(NewAdmin {
            username,
            password_hash,
            name: input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            email,
            role_id: input.role_id,
            is_active: input.is_active,
        })
        .await?;
    info!(admin_id = %admin.id, username = %admin.username, "admin created");
    Ok(admin)
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAdmin {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

pub async fn update_admin(state: &AppState, id: Uuid, input: UpdateAdmin) -> AppResult<AdminUser> {
    let password_hash = input.password.as_deref().map(validate_and_hash).transpose()?;
    let patch = AdminPatch {
        name: input.name.map(|n| n.trim().to_string()),
        email: clean_email(input.email)?,
        role_id: input.role_id,
        is_active: input.is_active,
        password_hash,
    };
    if patch.name.is_none()
        && patch.email.is_none()
        && patch.role_id.is_none()
        && patch.is_active.is_none()
        && patch.password_hash.is_none()
    {
        return Err(AppError::validation("nothing to update"));
    }
    if let Some(role_id) = patch.role_id {
        ensure_role(state, role_id).await?;
    }

    let admin = state
        .store
        .update_admin(id, patch)
        .await?
        .ok_or(AppError::NotFound("admin"))?;
    info!(admin_id = %admin.id, "admin updated");
    Ok(admin)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        admin::capability::Capability, auth::password, config::AppConfig,
        store::memory::MemoryStore,
    };

    async fn role(state: &AppState, name: &str, caps: &[Capability]) -> Role {
        create_role(
            state,
            NewRole {
                role_name: name.into(),
                description: None,
                capabilities: caps.iter().copied().collect(),
            },
        )
        .await
        .unwrap()
    }

    fn admin_input(username: &str, role_id: Uuid) -> CreateAdmin {
        CreateAdmin {
            username: username.into(),
            password: "long-enough".into(),
            name: Some("Ops".into()),
            email: Some("OPS@example.com".into()),
            role_id,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn bootstrap_runs_once() {
        let mut config = AppConfig::for_tests();
        config.bootstrap_admin = Some(BootstrapAdmin {
            username: "root".into(),
            password: "change-me-now".into(),
        });
        let state = AppState::from_parts(Arc::new(MemoryStore::new()), Arc::new(config));

        let admin = bootstrap(&state).await.unwrap().expect("admin created");
        assert!(password::verify("change-me-now", &admin.password_hash).unwrap());
        let roles = list_roles(&state).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].role_name, SUPER_ADMIN_ROLE);
        assert_eq!(roles[0].capabilities, CapabilitySet::all());

        assert!(bootstrap(&state).await.unwrap().is_none());
        assert_eq!(list_admins(&state).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_without_config_does_nothing() {
        let state = AppState::fake();
        assert!(bootstrap(&state).await.unwrap().is_none());
        assert!(list_roles(&state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn role_lifecycle() {
        let state = AppState::fake();
        let support = role(&state, "support", &[Capability::ViewUsers]).await;

        let dup = create_role(
            &state,
            NewRole {
                role_name: " support ".into(),
                description: None,
                capabilities: CapabilitySet::empty(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(dup, AppError::Conflict(_)));

        let updated = update_role(
            &state,
            support.id,
            RolePatch {
                capabilities: Some([Capability::ViewUsers, Capability::ViewLedger].into_iter().collect()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(updated.capabilities.contains(Capability::ViewLedger));

        let admin = create_admin(&state, admin_input("helper", support.id)).await.unwrap();
        let in_use = delete_role(&state, support.id).await.unwrap_err();
        assert!(matches!(in_use, AppError::Conflict(_)));

        let other = role(&state, "auditor", &[]).await;
        update_admin(
            &state,
            admin.id,
            UpdateAdmin {
                role_id: Some(other.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        delete_role(&state, support.id).await.unwrap();
        assert!(matches!(delete_role(&state, support.id).await.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn admin_creation_rules() {
        let state = AppState::fake();
        let ops = role(&state, "ops", &[Capability::AdjustCoins]).await;

        let admin = create_admin(&state, admin_input("alice", ops.id)).await.unwrap();
        assert_eq!(admin.email.as_deref(), Some("ops@example.com"));
        assert_ne!(admin.password_hash, "long-enough");

        let dup = create_admin(&state, admin_input("alice", ops.id)).await.unwrap_err();
        assert!(matches!(dup, AppError::Conflict(_)));

        let mut short = admin_input("bob", ops.id);
        short.password = "short".into();
        assert!(matches!(create_admin(&state, short).await.unwrap_err(), AppError::Validation(_)));

        let no_role = create_admin(&state, admin_input("carol", Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(no_role, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn admin_update_rehashes_password() {
        let state = AppState::fake();
        let ops = role(&state, "ops", &[]).await;
        let admin = create_admin(&state, admin_input("dave", ops.id)).await.unwrap();

        let empty = update_admin(&state, admin.id, UpdateAdmin::default()).await.unwrap_err();
        assert!(matches!(empty, AppError::Validation(_)));

        let updated = update_admin(
            &state,
            admin.id,
            UpdateAdmin {
                password: Some("a-new-password".into()),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!updated.is_active);
        assert!(password::verify("a-new-password", &updated.password_hash).unwrap());

        let missing = update_admin(
            &state,
            Uuid::new_v4(),
            UpdateAdmin {
                is_active: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }
}
