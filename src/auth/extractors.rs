use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use super::{claims::Scope, jwt::JwtKeys};
use crate::{
    admin::capability::{Authorize, CapabilitySet},
    error::AppError,
    state::AppState,
};

/// Extracts and validates a user-scoped access token, returning the user ID.
pub struct AuthUser(pub Uuid);

/// Authenticated admin with the capabilities of their role, loaded fresh
/// from the store on every request.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin_id: Uuid,
    pub username: String,
    pub role_name: String,
    pub capabilities: CapabilitySet,
}

impl Authorize for AdminSession {
    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?;

    // Expect "Bearer <token>"
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .ok_or_else(|| AppError::Unauthorized("invalid auth scheme".into()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = JwtKeys::from(&state.config.jwt)
            .verify_access(token, Scope::User)
            .map_err(|_| AppError::Unauthorized("invalid or expired token".into()))?;
        Ok(AuthUser(claims.sub))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let claims = JwtKeys::from(&state.config.jwt)
            .verify_access(token, Scope::Admin)
            .map_err(|_| AppError::Unauthorized("invalid or expired token".into()))?;

        let admin = match state.store.get_admin(claims.sub).await? {
            Some(admin) if admin.is_active => admin,
            _ => {
                warn!(admin_id = %claims.sub, "token for missing or disabled admin");
                return Err(AppError::Unauthorized("admin account disabled".into()));
            }
        };
        // a dangling role grants nothing
        let (role_name, capabilities) = match state.store.get_role(admin.role_id).await? {
            Some(role) => (role.role_name, role.capabilities),
            None => (String::new(), CapabilitySet::empty()),
        };

        Ok(AdminSession {
            admin_id: admin.id,
            username: admin.username,
            role_name,
            capabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header::AUTHORIZATION, Request};

    use super::*;
    use crate::admin::{
        capability::Capability,
        repo_types::{AdminPatch, NewAdmin, NewRole},
    };

    fn parts_with(token: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(t) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_user_accepts_only_user_access_tokens() {
        let state = AppState::fake();
        let keys = JwtKeys::from(&state.config.jwt);
        let id = Uuid::new_v4();

        let token = keys.sign_access(id, Scope::User).unwrap();
        let AuthUser(got) = AuthUser::from_request_parts(&mut parts_with(Some(&token)), &state)
            .await
            .unwrap();
        assert_eq!(got, id);

        let admin_token = keys.sign_access(id, Scope::Admin).unwrap();
        let refresh = keys.sign_refresh(id, Scope::User).unwrap();
        for t in [Some(admin_token.as_str()), Some(refresh.as_str()), None] {
            let err = AuthUser::from_request_parts(&mut parts_with(t), &state)
                .await
                .err()
                .unwrap();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }
    }

    #[tokio::test]
    async fn admin_session_loads_role_capabilities() {
        let state = AppState::fake();
        let role = state
            .store
            .insert_role(NewRole {
                role_name: "support".into(),
                description: None,
                capabilities: [Capability::ViewUsers].into_iter().collect(),
            })
            .await
            .unwrap();
        let admin = state
            .store
            .insert_admin(NewAdmin {
                username: "helper".into(),
                password_hash: "x".into(),
                name: None,
                email: None,
                role_id: role.id,
                is_active: true,
            })
            .await
            .unwrap();
        let token = JwtKeys::from(&state.config.jwt)
            .sign_access(admin.id, Scope::Admin)
            .unwrap();

        let session = AdminSession::from_request_parts(&mut parts_with(Some(&token)), &state)
            .await
            .unwrap();
        assert_eq!(session.role_name, "support");
        assert!(session.require(Capability::ViewUsers).is_ok());
        assert!(matches!(
            session.require(Capability::AdjustCoins),
            Err(AppError::Forbidden(Capability::AdjustCoins))
        ));

        // disabling the account invalidates outstanding tokens
        state
            .store
            .update_admin(
                admin.id,
                AdminPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = AdminSession::from_request_parts(&mut parts_with(Some(&token)), &state)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
