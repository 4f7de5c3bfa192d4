//! Edit locks, autosave shadows, commit and conflict detection for records.

pub mod autosave;
pub mod conflict;
pub mod progress;
pub mod resolver;
pub mod save;
pub mod service;
pub mod tracker;

pub use service::{Clock, Collaborators, EditingOptions, EditingService};
