// SPDX-License-Identifier: Apache-2.0
use std::fs;
use std::time::Duration;

use tracing::warn;

use crate::email::EmailConfig;
use crate::error::{AuthError, AuthResult};
use crate::shield::ShieldMode;

/// Environment variable names. Keys without a default are required and
/// missing values abort startup.
pub const SHIELD_API_KEY_ENV: &str = "LEARNGATE_SHIELD_API_KEY";
pub const GITHUB_CLIENT_ID_ENV: &str = "LEARNGATE_GITHUB_CLIENT_ID";
pub const GITHUB_CLIENT_SECRET_ENV: &str = "LEARNGATE_GITHUB_CLIENT_SECRET";
pub const DATABASE_URL_ENV: &str = "LEARNGATE_DATABASE_URL";
pub const SESSION_SECRET_ENV: &str = "LEARNGATE_SESSION_SECRET";
pub const OTP_TTL_ENV: &str = "LEARNGATE_OTP_TTL_SECS";
pub const SESSION_TTL_ENV: &str = "LEARNGATE_SESSION_TTL_MINUTES";
pub const BOOTSTRAP_ADMINS_ENV: &str = "LEARNGATE_BOOTSTRAP_ADMINS";
pub const BIND_ADDR_ENV: &str = "LEARNGATE_BIND_ADDR";
pub const EMAIL_CONFIG_ENV: &str = "LEARNGATE_EMAIL_CONFIG";
pub const SHIELD_MODE_ENV: &str = "LEARNGATE_SHIELD_MODE";
pub const IMAGE_HOSTS_ENV: &str = "LEARNGATE_IMAGE_HOSTS";

pub const DEFAULT_OTP_TTL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 60 * 24 * 7;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8088";
const DEFAULT_EMAIL_CONFIG_PATH: &str = "config/email.toml";
// Development-only fallback; never use in production
const DEV_SESSION_SECRET: &[u8] = b"learngate_dev_only_session_secret_please_change_in_production";

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Immutable process configuration, constructed once at startup and passed
/// by reference to every component that needs it. Required keys missing or
/// malformed fail the whole startup before the server binds.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub shield_api_key: String,
    pub github: GithubConfig,
    pub database_url: String,
    pub session_secret: Vec<u8>,
    pub session_ttl_minutes: u64,
    pub otp_ttl: Duration,
    pub bootstrap_admins: Vec<String>,
    pub email: EmailConfig,
    pub bind_addr: String,
    pub shield_mode: ShieldMode,
    pub extra_image_hosts: Vec<String>,
}

fn required(key: &'static str) -> AuthResult<String> {
    let value = std::env::var(key).map_err(|_| AuthError::ConfigMissing(key))?;
    if value.trim().is_empty() {
        return Err(AuthError::ConfigInvalid {
            key,
            reason: "value is empty".into(),
        });
    }
    Ok(value)
}

fn parsed<T: std::str::FromStr>(key: &'static str, default: T) -> AuthResult<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|e: T::Err| AuthError::ConfigInvalid {
            key,
            reason: e.to_string(),
        }),
    }
}

fn list(key: &'static str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl AppConfig {
    /// Loads the full configuration: email settings from the TOML file,
    /// everything else from the environment.
    pub fn from_env() -> AuthResult<Self> {
        let path = std::env::var(EMAIL_CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_EMAIL_CONFIG_PATH.to_string());
        let text = fs::read_to_string(&path).map_err(|e| AuthError::ConfigInvalid {
            key: EMAIL_CONFIG_ENV,
            reason: format!("cannot read {path}: {e}"),
        })?;
        let email: EmailConfig = toml::from_str(&text).map_err(|e| AuthError::ConfigInvalid {
            key: EMAIL_CONFIG_ENV,
            reason: format!("cannot parse {path}: {e}"),
        })?;
        Self::from_env_with_email(email)
    }

    /// Environment half of the loader, split out so tests can inject the
    /// email settings without touching the filesystem.
    pub fn from_env_with_email(email: EmailConfig) -> AuthResult<Self> {
        let shield_api_key = required(SHIELD_API_KEY_ENV)?;
        let github = GithubConfig {
            client_id: required(GITHUB_CLIENT_ID_ENV)?,
            client_secret: required(GITHUB_CLIENT_SECRET_ENV)?,
        };
        let database_url = required(DATABASE_URL_ENV)?;

        let session_secret = match std::env::var(SESSION_SECRET_ENV) {
            Ok(secret) => secret.into_bytes(),
            Err(_) => {
                warn!("no session secret set in environment, using development default");
                DEV_SESSION_SECRET.to_vec()
            }
        };
        // Cookie key derivation needs at least 32 bytes of input
        if session_secret.len() < 32 {
            return Err(AuthError::ConfigInvalid {
                key: SESSION_SECRET_ENV,
                reason: "must be at least 32 bytes".into(),
            });
        }

        let otp_ttl_secs: u64 = parsed(OTP_TTL_ENV, DEFAULT_OTP_TTL_SECS)?;
        let session_ttl_minutes: u64 = parsed(SESSION_TTL_ENV, DEFAULT_SESSION_TTL_MINUTES)?;

        let shield_mode = match std::env::var(SHIELD_MODE_ENV) {
            Err(_) => ShieldMode::Live,
            Ok(raw) => ShieldMode::parse(&raw).ok_or(AuthError::ConfigInvalid {
                key: SHIELD_MODE_ENV,
                reason: format!("expected LIVE or DRY_RUN, got {raw}"),
            })?,
        };

        Ok(Self {
            shield_api_key,
            github,
            database_url,
            session_secret,
            session_ttl_minutes,
            otp_ttl: Duration::from_secs(otp_ttl_secs),
            bootstrap_admins: list(BOOTSTRAP_ADMINS_ENV),
            email,
            bind_addr: std::env::var(BIND_ADDR_ENV)
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            shield_mode,
            extra_image_hosts: list(IMAGE_HOSTS_ENV),
        })
    }

    /// Development defaults, also used by tests. Real deployments go
    /// through `from_env`.
    pub fn dev_default() -> Self {
        Self {
            shield_api_key: "ajkey_dev".into(),
            github: GithubConfig {
                client_id: "dev-client-id".into(),
                client_secret: "dev-client-secret".into(),
            },
            database_url: "postgres://localhost/learngate_dev".into(),
            session_secret: DEV_SESSION_SECRET.to_vec(),
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECS),
            bootstrap_admins: Vec::new(),
            email: EmailConfig {
                smtp_host: "localhost".into(),
                smtp_port: 587,
                smtp_user: "dev".into(),
                smtp_pass: "dev".into(),
                from_address: "Ethio Learners <onboarding@resend.dev>".into(),
                recipients: vec!["abelgideontk7@gmail.com".into()],
                subject: "Ethio Learners - Verify your email".into(),
                body_template: "<p>Your OTP is <strong>{otp}</strong></p>".into(),
            },
            bind_addr: DEFAULT_BIND_ADDR.into(),
            shield_mode: ShieldMode::Live,
            extra_image_hosts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_required() -> Vec<(&'static str, Option<&'static str>)> {
        vec![
            (SHIELD_API_KEY_ENV, Some("ajkey_test")),
            (GITHUB_CLIENT_ID_ENV, Some("client-id")),
            (GITHUB_CLIENT_SECRET_ENV, Some("client-secret")),
            (DATABASE_URL_ENV, Some("postgres://localhost/learngate")),
        ]
    }

    #[test]
    fn loads_with_all_required_keys() {
        temp_env::with_vars(all_required(), || {
            let config = AppConfig::from_env_with_email(AppConfig::dev_default().email).unwrap();
            assert_eq!(config.shield_api_key, "ajkey_test");
            assert_eq!(config.otp_ttl, Duration::from_secs(DEFAULT_OTP_TTL_SECS));
            assert_eq!(config.shield_mode, ShieldMode::Live);
        });
    }

    #[test]
    fn missing_required_key_fails_startup() {
        let mut vars = all_required();
        vars[0] = (SHIELD_API_KEY_ENV, None);
        temp_env::with_vars(vars, || {
            let err = AppConfig::from_env_with_email(AppConfig::dev_default().email).unwrap_err();
            assert!(matches!(
                err,
                AuthError::ConfigMissing(key) if key == SHIELD_API_KEY_ENV
            ));
        });
    }

    #[test]
    fn malformed_ttl_fails_startup() {
        let mut vars = all_required();
        vars.push((OTP_TTL_ENV, Some("five minutes")));
        temp_env::with_vars(vars, || {
            let err = AppConfig::from_env_with_email(AppConfig::dev_default().email).unwrap_err();
            assert!(matches!(err, AuthError::ConfigInvalid { key, .. } if key == OTP_TTL_ENV));
        });
    }

    #[test]
    fn unknown_shield_mode_fails_startup() {
        let mut vars = all_required();
        vars.push((SHIELD_MODE_ENV, Some("MAYBE")));
        temp_env::with_vars(vars, || {
            assert!(AppConfig::from_env_with_email(AppConfig::dev_default().email).is_err());
        });
    }

    #[test]
    fn bootstrap_admin_list_splits_on_commas() {
        let mut vars = all_required();
        vars.push((BOOTSTRAP_ADMINS_ENV, Some("root@a.com, ops@b.com")));
        temp_env::with_vars(vars, || {
            let config = AppConfig::from_env_with_email(AppConfig::dev_default().email).unwrap();
            assert_eq!(config.bootstrap_admins, vec!["root@a.com", "ops@b.com"]);
        });
    }
}
