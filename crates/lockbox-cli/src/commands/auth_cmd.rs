use lockbox_core::SessionPersistence;

use crate::commands::common::{is_synced, CliContext};
use crate::error::CliError;

pub async fn run_register(
    context: &CliContext,
    username: &str,
    password: &str,
) -> Result<(), CliError> {
    let user_id = context.auth()?.register(username, password).await?;
    println!("Registered '{}' (user id {user_id})", username.trim());
    Ok(())
}

pub async fn run_login(
    context: &CliContext,
    username: &str,
    password: &str,
) -> Result<(), CliError> {
    let session = context.auth()?.login(username, password).await?;
    println!(
        "Signed in to {} as '{}' (user id {})",
        context.config.server_url,
        username.trim(),
        session.owner()
    );
    Ok(())
}

pub fn run_logout(context: &CliContext) -> Result<(), CliError> {
    context.auth()?.logout()?;
    println!("Signed out of {}", context.config.server_url);
    Ok(())
}

pub async fn run_status(context: &CliContext) -> Result<(), CliError> {
    println!("server:   {}", context.config.server_url);
    println!("cache:    {}", context.db_path.display());

    let Some(session) = context.session_store().load_session()? else {
        println!("session:  not signed in");
        return Ok(());
    };
    println!("session:  user id {}", session.owner());

    let reconciler = context.reconciler()?;
    let cache = reconciler.cache();
    let unsynced = cache
        .list_active(&session)
        .await?
        .iter()
        .filter(|record| !is_synced(record))
        .count();
    let deletes = cache.list_pending_deletes(&session).await?.len();
    println!("pending:  {unsynced} change(s), {deletes} deletion(s)");
    Ok(())
}
