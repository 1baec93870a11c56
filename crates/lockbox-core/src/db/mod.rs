//! Database layer for Lockbox

mod cache;
mod connection;
mod migrations;

pub use cache::LocalCache;
pub use connection::Database;
