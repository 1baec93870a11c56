//! Remote vault contract and its HTTP implementation.

mod client;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

pub use client::HttpVaultClient;

use crate::auth::Session;
use crate::error::{Error, Result};
use crate::models::LockBox;
use crate::util::{compact_text, normalize_base_url};

/// Authoritative store reached over the network.
///
/// Implementations encrypt payload fields before they leave the process and
/// decrypt them right after they arrive. They never retry; transport failures
/// surface as [`Error::RemoteUnavailable`].
#[async_trait]
pub trait RemoteVault: Send + Sync {
    /// Create a record. Returns the server id.
    async fn create(&self, session: &Session, record: &LockBox) -> Result<i64>;

    async fn get(&self, session: &Session, name: &str) -> Result<LockBox>;

    /// Active records of the session owner, each decrypted on its own.
    async fn list_all(&self, session: &Session) -> Result<Vec<ListedRecord>>;

    /// Merge non-empty fields into the record with the same name.
    async fn update(&self, session: &Session, record: &LockBox) -> Result<()>;

    async fn delete(&self, session: &Session, name: &str) -> Result<()>;

    /// Insert or merge-restore by name, used by the sync loop. Returns the server id.
    async fn upsert(&self, session: &Session, record: &LockBox) -> Result<i64>;
}

/// One entry of a remote listing. A record that fails to decrypt keeps its
/// name so callers can report it and move on.
#[derive(Debug)]
pub struct ListedRecord {
    pub name: String,
    pub record: Result<LockBox>,
}

impl ListedRecord {
    pub fn decrypted(record: LockBox) -> Self {
        Self {
            name: record.name.clone(),
            record: Ok(record),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Map a non-success response onto the core error taxonomy.
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::CONFLICT => Error::AlreadyExists(message),
        _ => Error::remote(Some(status.as_u16()), message),
    }
}

pub(crate) fn transport_error(error: reqwest::Error) -> Error {
    Error::remote(
        error.status().map(|status| status.as_u16()),
        compact_text(&error.to_string()),
    )
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

pub(crate) fn normalize_endpoint(raw: String) -> Result<String> {
    if raw.trim().is_empty() {
        return Err(Error::Config("server URL must not be empty".to_string()));
    }
    normalize_base_url(&raw).ok_or_else(|| {
        Error::Config("server URL must include http:// or https://".to_string())
    })
}
