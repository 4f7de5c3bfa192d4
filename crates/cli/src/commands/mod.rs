// CLI subcommand dispatch.

use clap::Subcommand;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

pub mod autosave;
pub mod changes;
pub mod record;
pub mod save;
pub mod session;
pub mod share;

#[derive(Subcommand)]
pub enum Command {
    /// Log in, heartbeat or log out
    #[command(subcommand)]
    Session(session::SessionCommand),
    /// Create a record owned by you
    Create(share::CreateArgs),
    /// Give another user a permission on your record
    Grant(share::GrantArgs),
    /// Take a permission on your record away
    Revoke(share::GrantArgs),
    /// Open a record read-only
    View(record::RecordArgs),
    /// Take the edit lock on a record
    Edit(record::RecordArgs),
    /// Release your edit lock
    Unlock(record::RecordArgs),
    /// Delete a record you can edit
    Delete(record::RecordArgs),
    /// Work with autosaved (uncommitted) field content
    #[command(subcommand)]
    Autosave(autosave::AutosaveCommand),
    /// Commit autosaved fields to the record
    Save(save::SaveArgs),
    /// Show record fields if it changed after a given modification date
    Changes(changes::ChangesArgs),
}

/// Everything a command needs besides its own arguments.
pub struct Invocation {
    pub client: DaemonClient,
    pub user: String,
    pub format: OutputFormat,
}

pub async fn run(cmd: Command, invocation: &Invocation) -> anyhow::Result<()> {
    match cmd {
        Command::Session(cmd) => session::run(cmd, invocation).await,
        Command::Create(args) => share::create(args, invocation).await,
        Command::Grant(args) => share::grant(args, invocation).await,
        Command::Revoke(args) => share::revoke(args, invocation).await,
        Command::View(args) => record::view(args, invocation).await,
        Command::Edit(args) => record::edit(args, invocation).await,
        Command::Unlock(args) => record::unlock(args, invocation).await,
        Command::Delete(args) => record::delete(args, invocation).await,
        Command::Autosave(cmd) => autosave::run(cmd, invocation).await,
        Command::Save(args) => save::run(args, invocation).await,
        Command::Changes(args) => changes::run(args, invocation).await,
    }
}
