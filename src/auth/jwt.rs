use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, Scope, TokenKind};
use crate::{config::JwtConfig, state::AppState};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Access/refresh pair handed out on login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(1) as u64) * 60),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, sub: Uuid, scope: Scope, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            scope,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%sub, ?scope, ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, sub: Uuid, scope: Scope) -> anyhow::Result<String> {
        self.sign_with_kind(sub, scope, TokenKind::Access)
    }

    pub fn sign_refresh(&self, sub: Uuid, scope: Scope) -> anyhow::Result<String> {
        self.sign_with_kind(sub, scope, TokenKind::Refresh)
    }

    pub fn issue_pair(&self, sub: Uuid, scope: Scope) -> anyhow::Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign_access(sub, scope)?,
            refresh_token: self.sign_refresh(sub, scope)?,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(sub = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }

    /// Verifies an access token issued for `scope`.
    pub fn verify_access(&self, token: &str, scope: Scope) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            anyhow::bail!("access token required");
        }
        if claims.scope != scope {
            anyhow::bail!("token scope mismatch");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn make_keys(issuer: &str, audience: &str) -> JwtKeys {
        let mut config = AppConfig::for_tests();
        config.jwt.issuer = issuer.into();
        config.jwt.audience = audience.into();
        JwtKeys::from(&config.jwt)
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = JwtKeys::from_ref(&AppState::fake());
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id, Scope::User).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.scope, Scope::User);
    }

    #[test]
    fn sign_and_verify_refresh_token_and_verify_refresh() {
        let keys = make_keys("iss", "aud");
        let admin_id = Uuid::new_v4();
        let pair = keys.issue_pair(admin_id, Scope::Admin).expect("issue pair");
        let claims = keys.verify_refresh(&pair.refresh_token).expect("verify refresh");
        assert_eq!(claims.sub, admin_id);
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.scope, Scope::Admin);
    }

    #[test]
    fn verify_refresh_rejects_access_token() {
        let keys = make_keys("iss", "aud");
        let token = keys.sign_access(Uuid::new_v4(), Scope::User).expect("sign access");
        let err = keys.verify_refresh(&token).unwrap_err();
        assert!(err.to_string().contains("not a refresh token"));
    }

    #[test]
    fn verify_access_checks_kind_and_scope() {
        let keys = make_keys("iss", "aud");
        let user_token = keys.sign_access(Uuid::new_v4(), Scope::User).unwrap();
        assert!(keys.verify_access(&user_token, Scope::User).is_ok());
        let err = keys.verify_access(&user_token, Scope::Admin).unwrap_err();
        assert!(err.to_string().contains("scope"));

        let refresh = keys.sign_refresh(Uuid::new_v4(), Scope::User).unwrap();
        assert!(keys.verify_access(&refresh, Scope::User).is_err());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("good-iss", "good-aud");
        let bad_keys = make_keys("bad-iss", "bad-aud");
        let token = good_keys.sign_access(Uuid::new_v4(), Scope::User).expect("sign access");
        // Using different issuer/audience in validation should fail
        let err = bad_keys.verify(&token).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
