use crate::commands::common::{format_lockbox_lines, lockbox_to_item, CliContext, LockBoxItem};
use crate::error::CliError;

pub async fn run_list(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let session = context.session()?;
    let mut records = context.reconciler()?.list(&session).await?;
    records.sort_by(|left, right| left.name.cmp(&right.name));

    if as_json {
        let json_items = records
            .iter()
            .map(|record| lockbox_to_item(record, false))
            .collect::<Vec<LockBoxItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No lock boxes yet.");
        return Ok(());
    }

    for line in format_lockbox_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
