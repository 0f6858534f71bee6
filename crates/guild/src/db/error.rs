use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored result could not be encoded or decoded.
    #[error("Result JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another thread panicked while holding the connection or store lock.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}
