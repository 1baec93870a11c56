use lockbox_core::sync::{spawn_purge_loop, spawn_sync_loop};
use tokio::sync::watch;

use crate::commands::common::CliContext;
use crate::error::CliError;

/// Run the sync and purge loops until Ctrl-C.
pub async fn run_daemon(context: &CliContext) -> Result<(), CliError> {
    let session = context.session()?;
    let reconciler = context.reconciler()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sync = spawn_sync_loop(
        reconciler.clone(),
        session,
        context.config.sync_interval,
        shutdown_rx.clone(),
    );
    let purge = spawn_purge_loop(
        reconciler,
        context.config.retention,
        context.config.purge_interval,
        shutdown_rx,
    );
    println!(
        "Syncing with {} every {}s. Press Ctrl-C to stop.",
        context.config.server_url,
        context.config.sync_interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping background loops");
    let _ = shutdown_tx.send(true);

    sync.await
        .map_err(|error| CliError::Task(error.to_string()))?;
    purge
        .await
        .map_err(|error| CliError::Task(error.to_string()))?;
    Ok(())
}
