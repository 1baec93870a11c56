pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod create;
pub mod daemon;
pub mod delete;
pub mod get;
pub mod list;
pub mod sync;
pub mod update;
