use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub ttl_minutes: i64,
    pub code_length: usize,
    /// Return the code in the send-otp response (mock SMS, development only).
    pub echo_code: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralConfig {
    pub referrer_bonus: i64,
    pub referee_bonus: i64,
}

/// Admin login lockout.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub max_failed_logins: i32,
    pub lockout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub ledger: LedgerConfig,
    pub referral: ReferralConfig,
    pub security: SecurityConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let server = ServerConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_or("APP_PORT", 8080)?,
        };
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "foodid".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "foodid-clients".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
        };
        let otp = OtpConfig {
            ttl_minutes: env_or("OTP_TTL_MINUTES", 5)?,
            code_length: env_or("OTP_LENGTH", 6)?,
            echo_code: env_or("OTP_ECHO", false)?,
        };
        let ledger = LedgerConfig {
            max_retries: env_or("LEDGER_MAX_RETRIES", 3)?,
        };
        let referral = ReferralConfig {
            referrer_bonus: env_or("REFERRAL_BONUS_REFERRER", 50)?,
            referee_bonus: env_or("REFERRAL_BONUS_REFEREE", 25)?,
        };
        let security = SecurityConfig {
            max_failed_logins: env_or("ADMIN_MAX_FAILED_LOGINS", 5)?,
            lockout_minutes: env_or("ADMIN_LOCKOUT_MINUTES", 30)?,
        };
        let bootstrap_admin = match (
            std::env::var("ADMIN_BOOTSTRAP_USERNAME"),
            std::env::var("ADMIN_BOOTSTRAP_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) if !username.is_empty() => {
                Some(BootstrapAdmin { username, password })
            }
            _ => None,
        };

        Ok(Self {
            server,
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            otp,
            ledger,
            referral,
            security,
            bootstrap_admin,
        })
    }

    /// Config used by unit tests and the in-memory fake state.
    pub fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            database_url: None,
            database_max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            otp: OtpConfig {
                ttl_minutes: 5,
                code_length: 6,
                echo_code: true,
            },
            ledger: LedgerConfig { max_retries: 3 },
            referral: ReferralConfig {
                referrer_bonus: 50,
                referee_bonus: 25,
            },
            security: SecurityConfig {
                max_failed_logins: 5,
                lockout_minutes: 30,
            },
            bootstrap_admin: None,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        _ => Ok(default),
    }
}
