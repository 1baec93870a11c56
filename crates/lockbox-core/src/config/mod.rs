//! Client runtime configuration.
//!
//! Values come from `LOCKBOX_*` environment variables. The encryption key is
//! injected at startup and never compiled in.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::Codec;
use crate::error::{Error, Result};
use crate::util::{non_empty_trimmed, normalize_base_url};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct ClientConfig {
    pub server_url: String,
    encryption_key: String,
    pub db_path: Option<PathBuf>,
    pub sync_interval: Duration,
    pub purge_interval: Duration,
    pub retention: Duration,
    pub http_timeout: Duration,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("encryption_key", &"[REDACTED]")
            .field("db_path", &self.db_path)
            .field("sync_interval", &self.sync_interval)
            .field("purge_interval", &self.purge_interval)
            .field("retention", &self.retention)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_url = normalize_base_url(&value_or_default(
            &lookup,
            "LOCKBOX_SERVER_URL",
            "http://127.0.0.1:8080",
        ))
        .ok_or_else(|| {
            Error::Config("LOCKBOX_SERVER_URL must start with http:// or https://".to_string())
        })?;

        let encryption_key = required_trimmed(&lookup, "LOCKBOX_ENCRYPTION_KEY")?;
        // Fail fast on a key the codec would refuse
        Codec::from_base64(&encryption_key).map_err(|_| {
            Error::Config(
                "LOCKBOX_ENCRYPTION_KEY must be base64 of a 16, 24 or 32 byte key".to_string(),
            )
        })?;

        let db_path = optional_trimmed(&lookup, "LOCKBOX_DB_PATH").map(PathBuf::from);

        let sync_interval =
            seconds_in_range(&lookup, "LOCKBOX_SYNC_INTERVAL_SECS", "10", 1..=3_600)?;
        let purge_interval =
            seconds_in_range(&lookup, "LOCKBOX_PURGE_INTERVAL_SECS", "600", 10..=86_400)?;
        let retention =
            seconds_in_range(&lookup, "LOCKBOX_RETENTION_SECS", "86400", 60..=2_592_000)?;
        let http_timeout = seconds_in_range(&lookup, "LOCKBOX_HTTP_TIMEOUT_SECS", "10", 1..=120)?;

        Ok(Self {
            server_url,
            encryption_key,
            db_path,
            sync_interval,
            purge_interval,
            retention,
            http_timeout,
        })
    }

    /// Build the field codec from the configured key.
    pub fn codec(&self) -> Result<Codec> {
        Codec::from_base64(&self.encryption_key)
    }
}

fn seconds_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<Duration> {
    let invalid = || {
        Error::Config(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let seconds = value_or_default(&lookup, name, default)
        .parse::<u64>()
        .map_err(|_| invalid())?;
    if !range.contains(&seconds) {
        return Err(invalid());
    }
    Ok(Duration::from_secs(seconds))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional_trimmed(lookup, name)
        .ok_or_else(|| Error::Config(format!("missing required environment variable: {name}")))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    non_empty_trimmed(lookup(name))
}
