use crate::cli::LockBoxArgs;
use crate::commands::common::{input_from, is_synced, CliContext};
use crate::error::CliError;

pub async fn run_create(context: &CliContext, args: LockBoxArgs) -> Result<(), CliError> {
    let session = context.session()?;
    let record = context
        .reconciler()?
        .create(&session, input_from(args))
        .await?;

    if is_synced(&record) {
        println!("{}", record.name);
    } else {
        println!("{} (saved locally, will sync later)", record.name);
    }
    Ok(())
}
