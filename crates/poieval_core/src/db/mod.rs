//! Snapshot store database.
//!
//! # Responsibility
//! - Open the SQLite file that holds the snapshot registry and data tables.
//! - Bring the registry schema up to date and check it before first use.
//!
//! # Invariants
//! - The registry is usable only after `open_db`/`open_db_in_memory` succeed.
//! - Registry timestamps are Unix epoch milliseconds written by `epoch_millis`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Snapshot store failure.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer `poieval` registry layout.
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
    /// The `snapshots` registry lacks a column this build reads or writes.
    RegistryColumnMissing(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "snapshot store: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "snapshot store version {db_version} is newer than supported {latest_supported}"
            ),
            Self::RegistryColumnMissing(column) => {
                write!(f, "snapshot registry is missing column `{column}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::RegistryColumnMissing(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Current time as Unix epoch milliseconds.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
