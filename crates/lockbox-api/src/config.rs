use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Minimum HS256 secret length in bytes.
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub purge_interval: Duration,
    pub retention: Duration,
    pub rate_limit_window: Duration,
    pub login_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("purge_interval", &self.purge_interval)
            .field("retention", &self.retention)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "login_rate_limit_per_window",
                &self.login_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "LOCKBOX_API_BIND_ADDR", "127.0.0.1:8080");
        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "LOCKBOX_API_DB_PATH",
            "lockbox-api.db",
        ));

        let jwt_secret = required_trimmed(&lookup, "LOCKBOX_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "LOCKBOX_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }

        let token_ttl = seconds_in_range(&lookup, "LOCKBOX_TOKEN_TTL_SECS", "3600", 60..=604_800)?;
        let purge_interval =
            seconds_in_range(&lookup, "LOCKBOX_PURGE_INTERVAL_SECS", "600", 10..=86_400)?;
        let retention =
            seconds_in_range(&lookup, "LOCKBOX_RETENTION_SECS", "86400", 60..=2_592_000)?;
        let rate_limit_window =
            seconds_in_range(&lookup, "LOCKBOX_RATE_LIMIT_WINDOW_SECS", "60", 10..=3_600)?;

        let login_rate_limit_per_window =
            value_or_default(&lookup, "LOCKBOX_LOGIN_RATE_LIMIT_PER_WINDOW", "10")
                .parse::<u32>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "LOCKBOX_LOGIN_RATE_LIMIT_PER_WINDOW must be an integer in [1, 1000]"
                            .to_string(),
                    )
                })?;
        if !(1..=1_000).contains(&login_rate_limit_per_window) {
            return Err(ConfigError::Invalid(
                "LOCKBOX_LOGIN_RATE_LIMIT_PER_WINDOW must be in [1, 1000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            db_path,
            jwt_secret,
            token_ttl,
            purge_interval,
            retention,
            rate_limit_window,
            login_rate_limit_per_window,
        })
    }
}

fn seconds_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
    range: RangeInclusive<u64>,
) -> Result<Duration, ConfigError> {
    let seconds = value_or_default(&lookup, name, default)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [{}, {}]",
                range.start(),
                range.end()
            ))
        })?;
    if !range.contains(&seconds) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(Duration::from_secs(seconds))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "sensitive-jwt-secret-0123456789abcdef";

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_jwt_secret() {
        let map: HashMap<&str, &str> = HashMap::new();
        let err = config_from(&map).unwrap_err();
        assert!(err.to_string().contains("LOCKBOX_JWT_SECRET"));
    }

    #[test]
    fn short_jwt_secret_is_rejected() {
        let map = HashMap::from([("LOCKBOX_JWT_SECRET", "short")]);
        assert!(matches!(config_from(&map), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn defaults_apply() {
        let map = HashMap::from([("LOCKBOX_JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("lockbox-api.db"));
        assert_eq!(config.token_ttl, Duration::from_secs(3_600));
        assert_eq!(config.purge_interval, Duration::from_secs(600));
        assert_eq!(config.retention, Duration::from_secs(86_400));
        assert_eq!(config.login_rate_limit_per_window, 10);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let map = HashMap::from([
            ("LOCKBOX_JWT_SECRET", SECRET),
            ("LOCKBOX_TOKEN_TTL_SECS", "5"),
        ]);
        assert!(config_from(&map).is_err());

        let map = HashMap::from([
            ("LOCKBOX_JWT_SECRET", SECRET),
            ("LOCKBOX_LOGIN_RATE_LIMIT_PER_WINDOW", "0"),
        ]);
        assert!(config_from(&map).is_err());
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let map = HashMap::from([("LOCKBOX_JWT_SECRET", SECRET)]);
        let config = config_from(&map).unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(SECRET));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
