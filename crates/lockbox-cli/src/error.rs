use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lockbox_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Not signed in. Run `lockbox login --username <NAME> --password <PASSWORD>` first.")]
    NotSignedIn,
    #[error("Background task failed: {0}")]
    Task(String),
}
