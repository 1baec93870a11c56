use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_sync(context: &CliContext) -> Result<(), CliError> {
    let session = context.session()?;
    let report = context.reconciler()?.sync_tick(&session).await?;
    println!(
        "Sync completed: pushed={} deleted={} pulled={} failed={}",
        report.pushed, report.deleted, report.pulled, report.failed
    );
    Ok(())
}

pub async fn run_purge(context: &CliContext) -> Result<(), CliError> {
    let purged = context
        .reconciler()?
        .purge(context.config.retention)
        .await?;
    println!("Purged {purged} expired lock box(es)");
    Ok(())
}
