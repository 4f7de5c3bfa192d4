// labnote-common: shared types and utilities for the labnote workspace

pub mod field;
pub mod protocol;
pub mod types;
