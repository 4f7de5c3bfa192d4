// `labnote view|edit|unlock|delete`: lock lifecycle of a single record.

use clap::Args;
use labnote_common::protocol::rpc_methods::{RECORD_DELETE, RECORD_EDIT, RECORD_UNLOCK, RECORD_VIEW};
use labnote_common::types::{DeleteOutcome, EditStatus, Record, RecordId, UnlockAck, ViewResult};
use serde_json::json;

use super::Invocation;
use crate::output;

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Record id.
    pub record_id: RecordId,
}

pub async fn view(args: RecordArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let result: ViewResult = invocation
        .client
        .call(RECORD_VIEW, json!({ "record_id": args.record_id, "user": invocation.user }))
        .await?;
    output::print_output(invocation.format, &result, format_view)?;
    Ok(())
}

pub async fn edit(args: RecordArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let status: EditStatus = invocation
        .client
        .call(RECORD_EDIT, json!({ "record_id": args.record_id, "user": invocation.user }))
        .await?;
    output::print_output(invocation.format, &status, |status| format_status(args.record_id, status))?;
    Ok(())
}

pub async fn unlock(args: RecordArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let ack: UnlockAck = invocation
        .client
        .call(RECORD_UNLOCK, json!({ "record_id": args.record_id, "user": invocation.user }))
        .await?;
    output::print_output(invocation.format, &ack, format_unlock)?;
    Ok(())
}

pub async fn delete(args: RecordArgs, invocation: &Invocation) -> anyhow::Result<()> {
    let outcome: DeleteOutcome = invocation
        .client
        .call(RECORD_DELETE, json!({ "record_id": args.record_id, "user": invocation.user }))
        .await?;
    output::print_output(invocation.format, &outcome, |outcome| format_delete(args.record_id, outcome))?;
    if let DeleteOutcome::Refused { status, .. } = &outcome {
        anyhow::bail!("delete of record {} refused: {}", args.record_id, status.as_str());
    }
    Ok(())
}

pub(crate) fn format_status(record_id: RecordId, status: &EditStatus) -> String {
    match status {
        EditStatus::EditMode => format!("record {record_id}: editing (lock held)"),
        EditStatus::ViewMode => format!("record {record_id}: read-only"),
        EditStatus::CannotEditOtherEditing { holder } => {
            format!("record {record_id}: locked by {holder}")
        }
        EditStatus::AccessDenied => format!("record {record_id}: access denied"),
        EditStatus::CanNeverEdit => format!("record {record_id}: frozen (signed or deleted)"),
    }
}

pub(crate) fn format_fields(record: &Record) -> String {
    let mut lines = vec![format!(
        "# {} (record {}, modified {})",
        record.name, record.id, record.modification_date
    )];
    for field in &record.fields {
        lines.push(format!("  [{}] {} ({}): {}", field.id, field.name, field.kind.as_str(), field.content));
    }
    lines.join("\n")
}

fn format_view(result: &ViewResult) -> String {
    match &result.record {
        Some(record) => format!("{}\n{}", format_status(record.id, &result.status), format_fields(record)),
        None => result.status.as_str().to_string(),
    }
}

fn format_unlock(ack: &UnlockAck) -> String {
    if ack.released {
        format!("record {}: lock released", ack.record_id)
    } else {
        format!("record {}: no lock of yours to release", ack.record_id)
    }
}

fn format_delete(record_id: RecordId, outcome: &DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Deleted { navigation } => match navigation.parent_id {
            Some(parent) => format!("record {record_id}: deleted (back to {parent})"),
            None => format!("record {record_id}: deleted"),
        },
        DeleteOutcome::Refused { status, .. } => {
            format!("delete refused. {}", format_status(record_id, status))
        }
    }
}

#[cfg(test)]
mod tests {
    use labnote_common::field::FieldKind;
    use labnote_common::types::{Field, NavigationTarget};

    use super::*;
    use crate::output::OutputFormat;

    fn sample_record() -> Record {
        Record {
            id: 7,
            owner: "alice".into(),
            name: "Buffer prep".into(),
            parent_id: Some(2),
            fields: vec![Field {
                id: 70,
                name: "pH".into(),
                kind: FieldKind::Number { min: None, max: None, decimal_places: Some(1) },
                content: "7.4".into(),
            }],
            modification_date: 100,
            deleted: false,
            signed: false,
        }
    }

    #[test]
    fn locked_status_names_the_holder() {
        let status = EditStatus::CannotEditOtherEditing { holder: "alice".into() };
        assert_eq!(format_status(7, &status), "record 7: locked by alice");
    }

    #[test]
    fn view_lists_fields() {
        let result = ViewResult { status: EditStatus::ViewMode, record: Some(sample_record()) };
        let output = format_view(&result);
        assert!(output.contains("Buffer prep"));
        assert!(output.contains("[70] pH (number): 7.4"));
    }

    #[test]
    fn denied_view_has_no_fields() {
        let result = ViewResult { status: EditStatus::AccessDenied, record: None };
        assert_eq!(format_view(&result), "ACCESS_DENIED");
    }

    #[test]
    fn delete_outcomes_render() {
        let deleted = DeleteOutcome::Deleted {
            navigation: NavigationTarget { record_id: 7, parent_id: Some(2) },
        };
        assert_eq!(format_delete(7, &deleted), "record 7: deleted (back to 2)");

        let refused = DeleteOutcome::Refused {
            status: EditStatus::CannotEditOtherEditing { holder: "bob".into() },
            holder: Some("bob".into()),
        };
        assert!(format_delete(7, &refused).contains("locked by bob"));
    }

    #[test]
    fn unlock_json_roundtrips() {
        let ack = UnlockAck { record_id: 7, released: true };
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &ack, format_unlock).unwrap();
        let parsed: UnlockAck = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, ack);
    }
}
