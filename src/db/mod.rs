pub mod case_store;
pub mod sqlite;

pub use case_store::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Case bundle (de)serialization failed: {0}")]
    Serialization(String),

    #[error("Failed to prepare database directory {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Case store lock poisoned")]
    LockPoisoned,
}
