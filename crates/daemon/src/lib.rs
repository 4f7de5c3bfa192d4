// labnote-daemon library: record edit locks, autosave and commit, plus the
// sessions and grants they depend on, served over JSON-RPC.

pub mod audit;
pub mod collab;
pub mod config;
pub mod editing;
pub mod error;
pub mod rpc;
pub mod runtime;
pub mod security;
pub mod startup;
pub mod store;
pub mod workspace;
