//! lockbox-core - Core library for Lockbox
//!
//! Shared models, the field codec, the encrypted local cache, the remote
//! vault client and the reconciler used by the CLI and the API tests.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use auth::{AuthClient, Session, SessionPersistence};
pub use config::ClientConfig;
pub use crypto::Codec;
pub use db::LocalCache;
pub use error::{Error, Result};
pub use models::{LockBox, LockBoxInput, PayloadField};
pub use remote::{HttpVaultClient, ListedRecord, RemoteVault};
pub use sync::{Reconciler, SyncReport};
