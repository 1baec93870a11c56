//! Lock box model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One credential entry, scoped to a single owner.
///
/// `id` is assigned by the server and stays `0` until the first successful
/// remote create or upsert. All timestamps are Unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockBox {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub synced_at: Option<i64>,
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl LockBox {
    /// Build a fresh, unsynced record from user input.
    pub fn from_input(owner: impl Into<String>, input: LockBoxInput) -> Result<Self> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::NameRequired);
        }
        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: 0,
            owner: owner.into(),
            name,
            url: input.url,
            login: input.login,
            password: input.password,
            description: input.description,
            created_at: now,
            updated_at: now,
            synced_at: None,
            deleted_at: None,
        })
    }

    /// A record is active until it is soft-deleted.
    pub const fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether any payload field carries a value.
    pub fn has_payload(&self) -> bool {
        PayloadField::ALL
            .iter()
            .any(|field| !field.value(self).is_empty())
    }
}

/// User-supplied payload for create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockBoxInput {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub description: String,
}

impl LockBoxInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = login.into();
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The encrypted, independently updatable columns of a lock box.
///
/// Partial updates are built from this fixed set so column names never come
/// from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    Url,
    Login,
    Password,
    Description,
}

impl PayloadField {
    pub const ALL: [Self; 4] = [Self::Url, Self::Login, Self::Password, Self::Description];

    pub const fn column(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Login => "login",
            Self::Password => "password",
            Self::Description => "description",
        }
    }

    pub fn value(self, record: &LockBox) -> &str {
        match self {
            Self::Url => &record.url,
            Self::Login => &record.login,
            Self::Password => &record.password,
            Self::Description => &record.description,
        }
    }

    pub fn value_mut(self, record: &mut LockBox) -> &mut String {
        match self {
            Self::Url => &mut record.url,
            Self::Login => &mut record.login,
            Self::Password => &mut record.password,
            Self::Description => &mut record.description,
        }
    }
}
