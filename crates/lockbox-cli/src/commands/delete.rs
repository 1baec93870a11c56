use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_delete(context: &CliContext, name: &str) -> Result<(), CliError> {
    let session = context.session()?;
    context.reconciler()?.delete(&session, name).await?;
    println!("{}", name.trim());
    Ok(())
}
