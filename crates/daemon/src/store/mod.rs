// Persistence: SQLite labnote.db with records, grants and sessions.

pub mod grants;
pub mod meta_db;
pub mod records;
pub mod sessions;
