//! lockbox-api - authoritative lock box server
//!
//! Stores client-encrypted lock boxes per user behind bearer-token auth and
//! purges expired soft deletes in the background.

pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod rate_limit;
pub mod routes;
pub mod store;

pub use config::AppConfig;
pub use error::AppError;
pub use routes::{app_router, AppState};
pub use store::ServerStore;
