use std::{env, fmt::Display, fs::read_to_string, ops::RangeInclusive, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Secret {0} not found in /run/secrets or the environment")]
    MissingSecret(&'static str),
}

/// One minute to thirty days.
pub const SESSION_TTL_RANGE: RangeInclusive<i64> = 60..=30 * 24 * 60 * 60;

/// What the bcrypt crate accepts.
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Redis,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreKind::Redis),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store {other:?}, expected redis or memory")),
        }
    }
}

pub struct Config {
    pub port: u16,
    pub store: StoreKind,
    pub redis_url: String,
    pub cors_origin: Option<String>,
    pub session_secret: String,
    pub session_ttl_secs: i64,
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let cors_origin: String = try_load("CORS_ORIGIN", "")?;

        Ok(Self {
            port: try_load("RUST_PORT", "8000")?,
            store: try_load("STORE", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://redis:6379")?,
            cors_origin: Some(cors_origin).filter(|origin| !origin.is_empty()),
            session_secret: read_secret("SESSION_SECRET")?,
            session_ttl_secs: within(
                "SESSION_TTL_SECS",
                try_load("SESSION_TTL_SECS", "86400")?,
                SESSION_TTL_RANGE,
            )?,
            secure_cookies: try_load("COOKIE_SECURE", "true")?,
            bcrypt_cost: within(
                "BCRYPT_COST",
                try_load("BCRYPT_COST", "10")?,
                BCRYPT_COST_RANGE,
            )?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_value(key, &raw)
}

fn within<T>(key: &'static str, value: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        return Ok(value);
    }

    warn!("{key} value {value} out of range");
    Err(ConfigError::Invalid {
        key,
        reason: format!("{value} is outside {}..={}", range.start(), range.end()),
    })
}

fn read_secret(secret_name: &'static str) -> Result<String, ConfigError> {
    let path = format!("/run/secrets/{secret_name}");

    let secret = read_to_string(&path)
        .map(|s| s.trim().to_string())
        .or_else(|e| {
            warn!("Failed to read {secret_name} from file: {e}, trying environment");
            var(secret_name).ok_or(ConfigError::MissingSecret(secret_name))
        })?;

    if secret.is_empty() {
        return Err(ConfigError::MissingSecret(secret_name));
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind() {
        assert_eq!("redis".parse::<StoreKind>(), Ok(StoreKind::Redis));
        assert_eq!(" Memory ".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert!("postgres".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u16>("RUST_PORT", "8080").unwrap(), 8080);
        assert!(parse_value::<bool>("COOKIE_SECURE", "false").is_ok_and(|secure| !secure));
        assert!(matches!(
            parse_value::<u16>("RUST_PORT", "eighty"),
            Err(ConfigError::Invalid { key: "RUST_PORT", .. })
        ));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(within("SESSION_TTL_SECS", 86_400, SESSION_TTL_RANGE).unwrap(), 86_400);
        assert_eq!(within("BCRYPT_COST", 4, BCRYPT_COST_RANGE).unwrap(), 4);

        for ttl in [0, -1, i64::MAX] {
            assert!(matches!(
                within("SESSION_TTL_SECS", ttl, SESSION_TTL_RANGE),
                Err(ConfigError::Invalid { key: "SESSION_TTL_SECS", .. })
            ));
        }
        for cost in [0, 3, 32] {
            assert!(matches!(
                within("BCRYPT_COST", cost, BCRYPT_COST_RANGE),
                Err(ConfigError::Invalid { key: "BCRYPT_COST", .. })
            ));
        }
    }

    #[test]
    fn test_missing_secret() {
        let result = read_secret("LEADERBOARD_TEST_SECRET_THAT_IS_NEVER_SET");

        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }
}
