use crate::commands::common::{format_lockbox_detail, lockbox_to_item, CliContext};
use crate::error::CliError;

pub async fn run_get(context: &CliContext, name: &str, as_json: bool) -> Result<(), CliError> {
    let session = context.session()?;
    let record = context.reconciler()?.get(&session, name).await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&lockbox_to_item(&record, true))?
        );
    } else {
        for line in format_lockbox_detail(&record) {
            println!("{line}");
        }
    }
    Ok(())
}
