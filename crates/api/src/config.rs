//! Process configuration, read once at startup from the environment.
//!
//! Nothing here is global: `main` builds an [`AppConfig`] and hands it to the
//! service wiring.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::warn;

use orgwarden_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEV_ACTIVATION_SECRET: &str = "dev-activation-secret";
const DEV_RESET_SECRET: &str = "dev-reset-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("{0} must be set outside development")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: SecretString,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_hours: i64,
    pub jwt_leeway_secs: i64,
    pub activation_secret: SecretString,
    pub reset_secret: SecretString,
    pub activation_token_max_age: chrono::Duration,
    pub reset_token_max_age: chrono::Duration,
    /// Unset: in-memory store.
    pub database_url: Option<SecretString>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub redis_url: Option<String>,
    pub cache_enabled: bool,
    pub request_timeout: Duration,
    pub bcrypt_cost: u32,
    pub log_format: LogFormat,
    /// `APP_ENV=production` refuses the development secrets.
    pub production: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let production = get("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));

        let secret = |key: &'static str, dev_default: &str| -> Result<SecretString, ConfigError> {
            match get(key) {
                Some(value) => Ok(SecretString::from(value)),
                None if production => Err(ConfigError::Missing(key)),
                None => {
                    warn!(key, "secret not set; using insecure dev default");
                    Ok(SecretString::from(dev_default))
                }
            }
        };

        let config = Self {
            bind_addr: parsed(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            jwt_secret: secret("JWT_SECRET", DEV_JWT_SECRET)?,
            jwt_issuer: get("JWT_ISSUER").unwrap_or_else(|| "orgwarden".to_string()),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or_else(|| "orgwarden-api".to_string()),
            jwt_expiry_hours: parsed(&get, "JWT_EXPIRY_HOURS", 24)?,
            jwt_leeway_secs: parsed(&get, "JWT_LEEWAY_SECS", 0)?,
            activation_secret: secret("ACTIVATION_SECRET", DEV_ACTIVATION_SECRET)?,
            reset_secret: secret("RESET_SECRET", DEV_RESET_SECRET)?,
            activation_token_max_age: chrono::Duration::minutes(parsed(
                &get,
                "ACTIVATION_TOKEN_MAX_AGE_MINS",
                1440,
            )?),
            reset_token_max_age: chrono::Duration::minutes(parsed(&get, "RESET_TOKEN_MAX_AGE_MINS", 60)?),
            database_url: get("DATABASE_URL").map(SecretString::from),
            db_max_connections: parsed(&get, "DB_MAX_CONNECTIONS", 10)?,
            db_min_connections: parsed(&get, "DB_MIN_CONNECTIONS", 1)?,
            redis_url: get("REDIS_URL"),
            cache_enabled: parsed_bool(&get, "CACHE_ENABLED", false)?,
            request_timeout: Duration::from_secs(parsed(&get, "REQUEST_TIMEOUT_SECS", 15)?),
            bcrypt_cost: parsed(&get, "BCRYPT_COST", 12)?,
            log_format: match get("LOG_FORMAT") {
                Some(raw) => LogFormat::from_str(&raw).map_err(|message| ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    message,
                })?,
                None => LogFormat::default(),
            },
            production,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_expiry_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_EXPIRY_HOURS",
                message: "must be positive".to_string(),
            });
        }
        if self.jwt_leeway_secs < 0 {
            return Err(ConfigError::Invalid {
                key: "JWT_LEEWAY_SECS",
                message: "must not be negative".to_string(),
            });
        }
        if self.activation_token_max_age <= chrono::Duration::zero()
            || self.reset_token_max_age <= chrono::Duration::zero()
        {
            return Err(ConfigError::Invalid {
                key: "ACTIVATION_TOKEN_MAX_AGE_MINS",
                message: "token lifetimes must be positive".to_string(),
            });
        }
        if self.db_min_connections > self.db_max_connections {
            return Err(ConfigError::Invalid {
                key: "DB_MIN_CONNECTIONS",
                message: "must not exceed DB_MAX_CONNECTIONS".to_string(),
            });
        }
        if self.activation_secret.expose_secret() == self.reset_secret.expose_secret() {
            warn!("ACTIVATION_SECRET and RESET_SECRET are identical; tokens are still purpose-bound");
        }
        Ok(())
    }

    pub fn jwt_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt_expiry_hours)
    }
}

fn invalid<E: std::fmt::Display>(key: &'static str) -> impl Fn(E) -> ConfigError {
    move |e| ConfigError::Invalid {
        key,
        message: e.to_string(),
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(invalid(key)),
        None => Ok(default),
    }
}

fn parsed_bool(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got '{v}'"),
        }),
    }
}
