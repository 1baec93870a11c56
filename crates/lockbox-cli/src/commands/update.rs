use crate::cli::LockBoxArgs;
use crate::commands::common::{input_from, CliContext};
use crate::error::CliError;

pub async fn run_update(context: &CliContext, args: LockBoxArgs) -> Result<(), CliError> {
    let session = context.session()?;
    let input = input_from(args);
    let name = input.name.trim().to_string();
    context.reconciler()?.update(&session, input).await?;
    println!("{name}");
    Ok(())
}
