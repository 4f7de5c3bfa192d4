// `labnote autosave put|list|cancel`: shadow copies of in-progress field edits.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use labnote_common::protocol::rpc_methods::{AUTOSAVE_CANCEL, AUTOSAVE_FIELD, AUTOSAVE_LIST};
use labnote_common::types::{AutosavedFields, FieldId, NavigationTarget, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::record::RecordArgs;
use super::Invocation;
use crate::output;

#[derive(Debug, Subcommand)]
pub enum AutosaveCommand {
    /// Autosave new content for one field (requires the edit lock)
    Put(PutArgs),
    /// List autosaved fields of a record
    List(RecordArgs),
    /// Discard every autosaved field of a record
    Cancel(RecordArgs),
}

#[derive(Debug, Args)]
pub struct PutArgs {
    /// Field id.
    pub field_id: FieldId,

    /// New content.
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub content: Option<String>,

    /// Read the content from a file instead.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CancelResult {
    navigation: NavigationTarget,
}

pub async fn run(cmd: AutosaveCommand, invocation: &Invocation) -> anyhow::Result<()> {
    match cmd {
        AutosaveCommand::Put(args) => put(args, invocation).await,
        AutosaveCommand::List(args) => list(args, invocation).await,
        AutosaveCommand::Cancel(args) => cancel(args, invocation).await,
    }
}

async fn put(args: PutArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let content = resolve_content(args.content, args.file.as_ref())?;
    let result: serde_json::Value = invocation
        .client
        .call(
            AUTOSAVE_FIELD,
            json!({ "field_id": args.field_id, "user": invocation.user, "content": content }),
        )
        .await?;
    output::print_output(invocation.format, &result, |_| format!("field {}: autosaved", args.field_id))?;
    Ok(())
}

async fn list(args: RecordArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let result: AutosavedFields = invocation
        .client
        .call(AUTOSAVE_LIST, json!({ "record_id": args.record_id, "user": invocation.user }))
        .await?;
    output::print_output(invocation.format, &result, format_list)?;
    Ok(())
}

async fn cancel(args: RecordArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let result: CancelResult = invocation
        .client
        .call(AUTOSAVE_CANCEL, json!({ "record_id": args.record_id, "user": invocation.user }))
        .await?;
    output::print_output(invocation.format, &result, |result| {
        format_cancel(args.record_id, &result.navigation)
    })?;
    Ok(())
}

fn resolve_content(content: Option<String>, file: Option<&PathBuf>) -> anyhow::Result<String> {
    match (content, file) {
        (Some(content), _) => Ok(content),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read field content from `{}`", path.display())),
        (None, None) => anyhow::bail!("either CONTENT or --file is required"),
    }
}

fn format_list(result: &AutosavedFields) -> String {
    if !result.has_autosave {
        return format!("record {}: nothing autosaved", result.record_id);
    }
    let mut lines = vec![format!("record {}: {} autosaved field(s)", result.record_id, result.fields.len())];
    for field in &result.fields {
        lines.push(format!("  [{}] {}: {}", field.id, field.name, field.content));
    }
    lines.join("\n")
}

fn format_cancel(record_id: RecordId, navigation: &NavigationTarget) -> String {
    match navigation.parent_id {
        Some(parent) => format!("record {record_id}: autosave discarded (back to {parent})"),
        None => format!("record {record_id}: autosave discarded"),
    }
}
