// `labnote save`: commit autosaved fields to the canonical record.

use clap::Args;
use labnote_common::protocol::rpc_methods::RECORD_SAVE;
use labnote_common::types::{ModificationDate, RecordId, SaveOutcome};
use serde_json::json;

use super::Invocation;
use crate::output;

#[derive(Debug, Args)]
pub struct SaveArgs {
    /// Record id.
    pub record_id: RecordId,

    /// Release the edit lock after a successful save.
    #[arg(long)]
    pub release: bool,

    /// Refuse the save if the record was modified after this date.
    #[arg(long)]
    pub baseline: Option<ModificationDate>,
}

pub async fn run(args: SaveArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let outcome: SaveOutcome = invocation
        .client
        .call(
            RECORD_SAVE,
            json!({
                "record_id": args.record_id,
                "user": invocation.user,
                "release_lock": args.release,
                "baseline": args.baseline,
            }),
        )
        .await?;

    for warning in &outcome.warnings {
        output::print_warning(invocation.format, "SAVE_WARNING", warning);
    }
    output::print_output(invocation.format, &outcome, format_human)?;
    Ok(())
}

fn format_human(outcome: &SaveOutcome) -> String {
    let mut msg = format!(
        "record {}: saved {} field(s), modified {}",
        outcome.record_id,
        outcome.merged_fields.len(),
        outcome.modification_date
    );
    if outcome.lock_released {
        msg.push_str(", lock released");
    }
    msg
}
