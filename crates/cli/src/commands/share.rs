// `labnote create|grant|revoke`: new records and who may touch them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use labnote_common::protocol::rpc_methods::{RECORD_CREATE, RECORD_GRANT, RECORD_REVOKE};
use labnote_common::types::{GrantAck, Permission, Record, RecordId};
use serde_json::{json, Value};

use super::record::format_fields;
use super::Invocation;
use crate::output;

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Record name.
    pub name: String,

    /// Parent record to file the new record under.
    #[arg(long)]
    pub parent: Option<RecordId>,

    /// JSON array of fields: `[{"name": "pH", "kind": {"type": "number"}, "content": "7"}]`.
    #[arg(long)]
    pub fields: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GrantArgs {
    /// Record id.
    pub record_id: RecordId,

    /// User receiving (or losing) the permission.
    pub grantee: String,

    /// read, write or delete.
    #[arg(value_parser = parse_permission)]
    pub permission: Permission,
}

pub async fn create(args: CreateArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let fields = match &args.fields {
        Some(path) => read_fields(path)?,
        None => Value::Array(Vec::new()),
    };
    let record: Record = invocation
        .client
        .call(
            RECORD_CREATE,
            json!({
                "user": invocation.user,
                "name": args.name,
                "parent_id": args.parent,
                "fields": fields,
            }),
        )
        .await?;
    output::print_output(invocation.format, &record, |record| {
        format!("created record {}\n{}", record.id, format_fields(record))
    })?;
    Ok(())
}

pub async fn grant(args: GrantArgs, invocation: &Invocation) -> anyhow::Result<()> {
    change_grant(RECORD_GRANT, "granted", args, invocation).await
}

pub async fn revoke(args: GrantArgs, invocation: &Invocation) -> anyhow::Result<()> {
    change_grant(RECORD_REVOKE, "revoked", args, invocation).await
}

async fn change_grant(
    method: &str,
    verb: &str,
    args: GrantArgs,
    invocation: &Invocation,
) -> anyhow::Result<()> {
    let ack: GrantAck = invocation
        .client
        .call(
            method,
            json!({
                "record_id": args.record_id,
                "user": invocation.user,
                "grantee": args.grantee,
                "permission": args.permission,
            }),
        )
        .await?;
    output::print_output(invocation.format, &ack, |ack| format_grant(verb, ack))?;
    Ok(())
}

fn parse_permission(value: &str) -> Result<Permission, String> {
    Permission::parse(&value.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown permission `{value}` (expected read, write or delete)"))
}

fn read_fields(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fields from `{}`", path.display()))?;
    let fields: Value = serde_json::from_str(&raw)
        .with_context(|| format!("`{}` is not valid JSON", path.display()))?;
    if !fields.is_array() {
        anyhow::bail!("`{}` must contain a JSON array of fields", path.display());
    }
    Ok(fields)
}

fn format_grant(verb: &str, ack: &GrantAck) -> String {
    let suffix = if ack.changed { "" } else { " (no change)" };
    format!(
        "record {}: {} {verb} to {}{suffix}",
        ack.record_id,
        ack.permission.as_str(),
        ack.grantee
    )
}
