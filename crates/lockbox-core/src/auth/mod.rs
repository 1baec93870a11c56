//! Session context and the login/register client.

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::{error_for_status, normalize_endpoint, transport_error};

/// Authenticated caller context carried into every cache, remote and
/// reconciler call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    owner: String,
    token: String,
}

impl Session {
    pub fn new(owner: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let owner = owner.into().trim().to_string();
        let token = token.into().trim().to_string();
        if owner.is_empty() {
            return Err(Error::Auth("session owner is missing".to_string()));
        }
        if token.is_empty() {
            return Err(Error::Auth("session token is missing".to_string()));
        }
        Ok(Self { owner, token })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Re-check a session that came from storage or deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() || self.token.trim().is_empty() {
            return Err(Error::Auth("session is incomplete".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("owner", &self.owner)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Where a client keeps its session between runs.
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> Result<Option<Session>>;
    fn save_session(&self, session: &Session) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user_id: String,
}

#[derive(Deserialize)]
struct RegisterResponse {
    user_id: String,
}

/// Client for the server's user registration and login endpoints.
#[derive(Clone)]
pub struct AuthClient<S: SessionPersistence> {
    base_url: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> AuthClient<S> {
    pub fn new(base_url: impl Into<String>, client: Client, store: S) -> Result<Self> {
        Ok(Self {
            base_url: normalize_endpoint(base_url.into())?,
            client,
            store,
        })
    }

    /// Register a new user. Returns the server-assigned user id.
    pub async fn register(&self, username: &str, password: &str) -> Result<String> {
        validate_credentials(username, password)?;

        let response = self
            .client
            .post(format!("{}/api/users/", self.base_url))
            .json(&Credentials { username, password })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(match error_for_status(status, &body) {
                Error::AlreadyExists(_) => Error::AlreadyExists(username.to_string()),
                other => other,
            });
        }

        let payload = response
            .json::<RegisterResponse>()
            .await
            .map_err(transport_error)?;
        tracing::info!("Registered new user");
        Ok(payload.user_id)
    }

    /// Log in and persist the resulting session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        validate_credentials(username, password)?;

        let response = self
            .client
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&Credentials { username, password })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &body));
        }

        let payload = response
            .json::<LoginResponse>()
            .await
            .map_err(transport_error)?;
        let session = Session::new(payload.user_id, payload.token)?;
        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Load the persisted session, if any.
    pub fn restore_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.store.load_session()? else {
            return Ok(None);
        };
        if let Err(error) = session.validate() {
            tracing::warn!("Discarding persisted session: {}", error);
            self.store.clear_session()?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear_session()
    }
}

/// Shortest accepted username, after trimming.
pub const MIN_USERNAME_CHARS: usize = 3;
/// Shortest accepted account password.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Account credential rules, checked before any request is sent.
pub fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().chars().count() < MIN_USERNAME_CHARS {
        return Err(Error::InvalidInput(format!(
            "username must be at least {MIN_USERNAME_CHARS} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(Error::InvalidInput(format!(
            "password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}
