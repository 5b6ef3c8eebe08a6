use chrono::{Duration, Utc};
use std::str::FromStr;
use thiserror::Error;

use crate::db::{PasswordPolicy, MAX_BCRYPT_COST, MIN_BCRYPT_COST};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub workers: usize,
    pub jwt_key: String,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub password_policy: PasswordPolicy,
    pub seed_users: usize,
    pub seed_tweets_per_user: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_key = var("JWT_KEY")
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("JWT_KEY"))?;

        let defaults = PasswordPolicy::default();
        let password_policy = PasswordPolicy {
            min_length: parse(&var, "PASSWORD_MIN_LENGTH", defaults.min_length)?,
            require_digit: parse(&var, "PASSWORD_REQUIRE_DIGIT", defaults.require_digit)?,
            require_lowercase: parse(
                &var,
                "PASSWORD_REQUIRE_LOWERCASE",
                defaults.require_lowercase,
            )?,
            require_uppercase: parse(
                &var,
                "PASSWORD_REQUIRE_UPPERCASE",
                defaults.require_uppercase,
            )?,
            require_non_alphanumeric: parse(
                &var,
                "PASSWORD_REQUIRE_NON_ALPHANUMERIC",
                defaults.require_non_alphanumeric,
            )?,
        };

        let bcrypt_cost = parse(&var, "BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        // Tokens must outlive their issue time, and the expiry must stay a
        // representable timestamp.
        let ttl_secs: i64 = parse(&var, "TOKEN_TTL_SECS", 3600)?;
        let token_ttl = Duration::try_seconds(ttl_secs)
            .filter(|ttl| ttl_secs > 0 && Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| ConfigError::Invalid {
                name: "TOKEN_TTL_SECS",
                value: ttl_secs.to_string(),
            })?;

        let workers = parse(&var, "WORKERS", num_cpus::get())?;
        if workers == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKERS",
                value: workers.to_string(),
            });
        }

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            workers,
            jwt_key,
            token_ttl,
            bcrypt_cost,
            password_policy,
            seed_users: parse(&var, "SEED_USERS", 0)?,
            seed_tweets_per_user: parse(&var, "SEED_TWEETS_PER_USER", 5)?,
        })
    }
}

fn parse<F, T>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
