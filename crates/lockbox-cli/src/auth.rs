//! Session persistence in the OS keychain, one entry per server.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;
use lockbox_core::{Error, Result, Session, SessionPersistence};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "lockbox-cli";

#[derive(Clone)]
pub struct SessionStore {
    username: String,
}

impl SessionStore {
    pub fn for_server(server_url: &str) -> Self {
        Self {
            username: format!("session:{}", server_url.trim_end_matches('/')),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username).map_err(secure_storage)
    }
}

fn secure_storage(error: impl std::fmt::Display) -> Error {
    Error::Auth(format!("secure storage: {error}"))
}

impl SessionPersistence for SessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> Result<Option<Session>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(secure_storage(error)),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> Result<Option<Session>> {
        let guard = Self::test_store().lock().map_err(secure_storage)?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw).map_err(Error::from))
            .transpose()
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?.set_password(&raw).map_err(secure_storage)
    }

    #[cfg(test)]
    fn save_session(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        let mut guard = Self::test_store().lock().map_err(secure_storage)?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> Result<()> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(secure_storage(error)),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> Result<()> {
        let mut guard = Self::test_store().lock().map_err(secure_storage)?;
        guard.remove(&self.username);
        Ok(())
    }
}
