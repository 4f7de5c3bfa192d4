// `labnote changes`: poll a record for commits newer than a known date.

use clap::Args;
use labnote_common::protocol::rpc_methods::RECORD_CHANGES_SINCE;
use labnote_common::types::{ChangeSet, ModificationDate, RecordId};
use serde_json::json;

use super::Invocation;
use crate::output;

#[derive(Debug, Args)]
pub struct ChangesArgs {
    /// Record id.
    pub record_id: RecordId,

    /// Modification date the caller last loaded.
    #[arg(long)]
    pub since: ModificationDate,
}

pub async fn run(args: ChangesArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let changes: ChangeSet = invocation
        .client
        .call(
            RECORD_CHANGES_SINCE,
            json!({
                "record_id": args.record_id,
                "user": invocation.user,
                "modification_date": args.since,
            }),
        )
        .await?;
    output::print_output(invocation.format, &changes, format_human)?;
    Ok(())
}

fn format_human(changes: &ChangeSet) -> String {
    if changes.fields.is_empty() {
        return format!("record {}: up to date ({})", changes.record_id, changes.modification_date);
    }
    let mut lines = vec![format!(
        "record {}: changed, now at {}",
        changes.record_id, changes.modification_date
    )];
    for field in &changes.fields {
        lines.push(format!("  [{}] {}: {}", field.id, field.name, field.content));
    }
    lines.join("\n")
}
