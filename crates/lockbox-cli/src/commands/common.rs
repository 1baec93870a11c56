use std::path::{Path, PathBuf};

use chrono::Utc;
use lockbox_core::util::normalize_base_url;
use lockbox_core::{
    AuthClient, ClientConfig, HttpVaultClient, LocalCache, LockBox, LockBoxInput, Reconciler,
    Session,
};
use serde::Serialize;

use crate::auth::SessionStore;
use crate::cli::LockBoxArgs;
use crate::error::CliError;

/// Resolved configuration for one CLI invocation.
pub struct CliContext {
    pub config: ClientConfig,
    pub db_path: PathBuf,
}

impl CliContext {
    pub fn load(db_path: Option<PathBuf>, server_url: Option<String>) -> Result<Self, CliError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(server_url) = server_url {
            config.server_url = normalize_server_url(&server_url)?;
        }
        let db_path = resolve_db_path(db_path, config.db_path.clone());
        Ok(Self { config, db_path })
    }

    pub fn session_store(&self) -> SessionStore {
        SessionStore::for_server(&self.config.server_url)
    }

    pub fn auth(&self) -> Result<AuthClient<SessionStore>, CliError> {
        let client = reqwest::Client::builder()
            .timeout(self.config.http_timeout)
            .build()
            .map_err(|error| lockbox_core::Error::Config(error.to_string()))?;
        Ok(AuthClient::new(
            self.config.server_url.clone(),
            client,
            self.session_store(),
        )?)
    }

    pub fn session(&self) -> Result<Session, CliError> {
        self.auth()?.restore_session()?.ok_or(CliError::NotSignedIn)
    }

    pub fn reconciler(&self) -> Result<Reconciler<HttpVaultClient>, CliError> {
        ensure_parent_dir(&self.db_path)?;
        let cache = LocalCache::open_path(&self.db_path, self.config.codec()?)?;
        let remote = HttpVaultClient::new(
            self.config.server_url.clone(),
            self.config.codec()?,
            self.config.http_timeout,
        )?;
        Ok(Reconciler::new(cache, remote))
    }
}

fn normalize_server_url(value: &str) -> Result<String, CliError> {
    normalize_base_url(value).ok_or_else(|| {
        lockbox_core::Error::Config("--server-url must start with http:// or https://".to_string())
            .into()
    })
}

fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or(config_db_path)
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir().map_or_else(
        || PathBuf::from("lockbox.db"),
        |dir| dir.join("lockbox").join("lockbox.db"),
    )
}

pub fn input_from(args: LockBoxArgs) -> LockBoxInput {
    let mut input = LockBoxInput::new(args.name);
    if let Some(url) = args.url {
        input = input.with_url(url);
    }
    if let Some(login) = args.login {
        input = input.with_login(login);
    }
    if let Some(password) = args.password {
        input = input.with_password(password);
    }
    if let Some(description) = args.description {
        input = input.with_description(description);
    }
    input
}

#[derive(Debug, Serialize)]
pub struct LockBoxItem {
    pub name: String,
    pub url: String,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub description: String,
    pub updated_at: i64,
    pub relative_time: String,
    pub synced: bool,
}

/// JSON shape for one record. Passwords are only revealed on request.
pub fn lockbox_to_item(record: &LockBox, reveal_password: bool) -> LockBoxItem {
    let now_ms = Utc::now().timestamp_millis();
    LockBoxItem {
        name: record.name.clone(),
        url: record.url.clone(),
        login: record.login.clone(),
        password: reveal_password.then(|| record.password.clone()),
        description: record.description.clone(),
        updated_at: record.updated_at,
        relative_time: format_relative_time(record.updated_at, now_ms),
        synced: is_synced(record),
    }
}

pub fn is_synced(record: &LockBox) -> bool {
    record
        .synced_at
        .is_some_and(|synced_at| synced_at >= record.updated_at)
}

pub fn format_lockbox_lines(records: &[LockBox]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| {
            let name = truncate(&record.name, 24);
            let login = truncate(&record.login, 24);
            let relative_time = format_relative_time(record.updated_at, now_ms);
            if is_synced(record) {
                format!("{name:<24}  {login:<24}  {relative_time}")
            } else {
                format!("{name:<24}  {login:<24}  {relative_time:<10}  (pending)")
            }
        })
        .collect()
}

pub fn format_lockbox_detail(record: &LockBox) -> Vec<String> {
    let mut lines = vec![format!("name:        {}", record.name)];
    if !record.url.is_empty() {
        lines.push(format!("url:         {}", record.url));
    }
    if !record.login.is_empty() {
        lines.push(format!("login:       {}", record.login));
    }
    if !record.password.is_empty() {
        lines.push(format!("password:    {}", record.password));
    }
    if !record.description.is_empty() {
        lines.push(format!("description: {}", record.description));
    }
    lines.push(format!("updated:     {}", format_timestamp(record.updated_at)));
    lines.push(format!(
        "synced:      {}",
        record
            .synced_at
            .map_or_else(|| "never".to_string(), format_timestamp)
    ));
    lines
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    const MINUTE: i64 = 60_000;
    const DAY: i64 = 24 * 60 * MINUTE;
    // Largest unit first
    const UNITS: [(i64, &str); 6] = [
        (365 * DAY, "y"),
        (30 * DAY, "mo"),
        (7 * DAY, "w"),
        (DAY, "d"),
        (60 * MINUTE, "h"),
        (MINUTE, "m"),
    ];

    let diff = now_ms.saturating_sub(timestamp_ms);
    UNITS
        .iter()
        .find(|(size, _)| diff >= *size)
        .map_or_else(
            || "just now".to_string(),
            |(size, label)| format!("{}{label} ago", diff / size),
        )
}
