// `labnote session login|heartbeat|logout`: keep your edit locks protected.
//
// A lock whose holder has no live session can be reclaimed by the next
// editor, so long edits should heartbeat.

use clap::{Args, Subcommand};
use labnote_common::protocol::rpc_methods::{SESSION_HEARTBEAT, SESSION_LOGIN, SESSION_LOGOUT};
use labnote_common::types::{SessionAck, SessionInfo};
use serde_json::json;

use super::Invocation;
use crate::output;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Open a session and print its id
    Login,
    /// Mark a session as still alive
    Heartbeat(SessionArgs),
    /// End a session
    Logout(SessionArgs),
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Session id printed by `labnote session login`.
    pub session_id: String,
}

pub async fn run(cmd: SessionCommand, invocation: &Invocation) -> anyhow::Result<()> {
    match cmd {
        SessionCommand::Login => {
            let session: SessionInfo = invocation
                .client
                .call(SESSION_LOGIN, json!({ "user": invocation.user }))
                .await?;
            output::print_output(invocation.format, &session, format_login)?;
        }
        SessionCommand::Heartbeat(args) => {
            let ack = ack(SESSION_HEARTBEAT, args, invocation).await?;
            output::print_output(invocation.format, &ack, |ack| format_ack("alive", ack))?;
            require_ok(&ack)?;
        }
        SessionCommand::Logout(args) => {
            let ack = ack(SESSION_LOGOUT, args, invocation).await?;
            output::print_output(invocation.format, &ack, |ack| format_ack("closed", ack))?;
            require_ok(&ack)?;
        }
    }
    Ok(())
}

async fn ack(method: &str, args: SessionArgs, invocation: &Invocation) -> anyhow::Result<SessionAck> {
    invocation
        .client
        .call(method, json!({ "session_id": args.session_id, "user": invocation.user }))
        .await
}

fn require_ok(ack: &SessionAck) -> anyhow::Result<()> {
    if !ack.ok {
        anyhow::bail!("session {} is unknown, already ended or not yours; log in again", ack.session_id);
    }
    Ok(())
}

fn format_login(session: &SessionInfo) -> String {
    format!(
        "session {} opened for {} at {}\nkeep it alive with `labnote session heartbeat {}`",
        session.session_id,
        session.user,
        session.started_at.to_rfc3339(),
        session.session_id
    )
}

fn format_ack(verb: &str, ack: &SessionAck) -> String {
    if ack.ok {
        format!("session {}: {verb}", ack.session_id)
    } else {
        format!("session {}: not found", ack.session_id)
    }
}
