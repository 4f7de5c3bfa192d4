//! Audit events emitted by the editing core.
//!
//! The audit trail itself is an external service; this module only defines
//! the event shape and two sinks: one that forwards events onto the
//! `labnote::audit` tracing target and one that keeps them in memory.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use labnote_common::types::RecordId;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::collab::AuditSink;

pub const AUDIT_TARGET: &str = "labnote::audit";
pub const SECURITY_TARGET: &str = "labnote::security";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    Write,
    Delete,
}

impl AuditKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Write => "WRITE",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: String,
    pub record_id: RecordId,
    pub kind: AuditKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: impl Into<String>,
        record_id: RecordId,
        kind: AuditKind,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.into(),
            record_id,
            kind,
            message: message.into(),
            at,
        }
    }
}

/// Forwards events to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn notify(&self, event: AuditEvent) {
        info!(
            target: AUDIT_TARGET,
            event_id = %event.id,
            actor = %event.actor,
            record_id = event.record_id,
            kind = event.kind.as_str(),
            at = %event.at.to_rfc3339(),
            "{}",
            event.message
        );
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn notify(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
