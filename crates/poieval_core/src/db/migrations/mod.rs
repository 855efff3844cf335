//! Snapshot registry schema.
//!
//! Registry layouts are numbered scripts tracked in `PRAGMA user_version`;
//! snapshot data tables are created per save and never migrated.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(version, script)` pairs in strictly increasing version order.
const REGISTRY_SCRIPTS: &[(u32, &str)] = &[(1, include_str!("0001_snapshots.sql"))];

/// Columns the snapshot repository reads and writes.
pub const REGISTRY_COLUMNS: &[&str] = &[
    "id",
    "name",
    "table_name",
    "row_count",
    "columns_json",
    "created_at",
];

/// Latest registry layout known by this binary.
pub fn latest_version() -> u32 {
    REGISTRY_SCRIPTS.last().map_or(0, |(version, _)| *version)
}

/// Runs pending registry scripts in one transaction, then checks the result.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file comes from a newer build.
/// - `RegistryColumnMissing` when `snapshots` does not match `REGISTRY_COLUMNS`.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    if stored < latest {
        let tx = conn.transaction()?;
        for (version, script) in REGISTRY_SCRIPTS.iter().filter(|(version, _)| *version > stored) {
            tx.execute_batch(script)?;
            tx.pragma_update(None, "user_version", version)?;
            info!("event=db_migrate module=db status=ok version={version}");
        }
        tx.commit()?;
    }

    verify_registry(conn)
}

fn verify_registry(conn: &Connection) -> DbResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('snapshots');")?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    match REGISTRY_COLUMNS
        .iter()
        .copied()
        .find(|column| !present.iter().any(|name| name.as_str() == *column))
    {
        Some(column) => Err(DbError::RegistryColumnMissing(column)),
        None => Ok(()),
    }
}
