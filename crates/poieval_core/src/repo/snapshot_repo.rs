//! Snapshot repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist result tables under a user-chosen name for offline evaluation.
//! - Keep a registry of stored snapshots with row counts and column lists.
//!
//! # Invariants
//! - Each snapshot owns exactly one `snap_<uuid>` data table.
//! - Registry row and data table are created and dropped in one transaction.
//! - `Json` cells are stored as JSON text and decoded again on load.

use crate::context::{ContextError, QueryContext, SqliteContext};
use crate::db::{epoch_millis, DbError};
use crate::model::table::{Table, Value};
use log::info;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const SNAPSHOT_SELECT_SQL: &str = "SELECT
    id,
    name,
    table_name,
    row_count,
    columns_json,
    created_at
FROM snapshots";

/// Stable identifier of a stored snapshot.
pub type SnapshotId = Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Snapshot persistence error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Context(ContextError),
    InvalidName(String),
    DuplicateName(String),
    NotFound(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Context(err) => write!(f, "{err}"),
            Self::InvalidName(name) => write!(f, "invalid snapshot name `{name}`"),
            Self::DuplicateName(name) => write!(f, "snapshot `{name}` already exists"),
            Self::NotFound(name) => write!(f, "snapshot not found: {name}"),
            Self::InvalidData(message) => write!(f, "invalid snapshot data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Context(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ContextError> for RepoError {
    fn from(value: ContextError) -> Self {
        Self::Context(value)
    }
}

/// Registry entry for one stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub name: String,
    pub table_name: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Repository interface for snapshot storage.
pub trait SnapshotRepository {
    fn save_snapshot(&self, name: &str, table: &Table) -> RepoResult<SnapshotId>;
    fn get_snapshot(&self, name: &str) -> RepoResult<Option<SnapshotRecord>>;
    fn list_snapshots(&self) -> RepoResult<Vec<SnapshotRecord>>;
    fn delete_snapshot(&self, name: &str) -> RepoResult<()>;
    fn load_snapshot(&self, name: &str) -> RepoResult<Table>;
}

/// SQLite-backed snapshot repository.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn require_snapshot(&self, name: &str) -> RepoResult<SnapshotRecord> {
        self.get_snapshot(name)?
            .ok_or_else(|| RepoError::NotFound(name.trim().to_string()))
    }
}

impl SnapshotRepository for SqliteSnapshotRepository<'_> {
    fn save_snapshot(&self, name: &str, table: &Table) -> RepoResult<SnapshotId> {
        let name = normalize_name(name)?;
        if table.columns().is_empty() {
            return Err(RepoError::InvalidData(
                "cannot store a table without columns".to_string(),
            ));
        }
        if self.get_snapshot(&name)?.is_some() {
            return Err(RepoError::DuplicateName(name));
        }

        let id = Uuid::new_v4();
        let table_name = format!("snap_{}", id.simple());
        let quoted_columns = table
            .columns()
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>();
        let columns_json = serde_json::to_string(table.columns())
            .map_err(|err| RepoError::InvalidData(format!("columns not serializable: {err}")))?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({});",
            quote_identifier(&table_name),
            quoted_columns.join(", ")
        ))?;

        {
            let placeholders = vec!["?"; quoted_columns.len()].join(", ");
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({placeholders});",
                quote_identifier(&table_name),
                quoted_columns.join(", ")
            ))?;
            for row in table.rows() {
                insert.execute(params_from_iter(row.iter().map(to_sql_value)))?;
            }
        }

        tx.execute(
            "INSERT INTO snapshots (id, name, table_name, row_count, columns_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                name.as_str(),
                table_name.as_str(),
                i64::try_from(table.len()).unwrap_or(i64::MAX),
                columns_json,
                epoch_millis(),
            ],
        )?;
        tx.commit()?;

        info!(
            "event=snapshot_save module=repo status=ok snapshot_id={} rows={}",
            id,
            table.len()
        );
        Ok(id)
    }

    fn get_snapshot(&self, name: &str) -> RepoResult<Option<SnapshotRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SNAPSHOT_SELECT_SQL} WHERE name = ?1;"))?;
        let record = stmt
            .query_row([name.trim()], |row| Ok(parse_snapshot_row(row)))
            .optional()?;
        record.transpose()
    }

    /// Newest first; saves within the same millisecond keep reverse insertion order.
    fn list_snapshots(&self) -> RepoResult<Vec<SnapshotRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SNAPSHOT_SELECT_SQL} ORDER BY created_at DESC, rowid DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_snapshot_row(row)?);
        }
        Ok(records)
    }

    fn delete_snapshot(&self, name: &str) -> RepoResult<()> {
        let record = self.require_snapshot(name)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};",
            quote_identifier(&record.table_name)
        ))?;
        tx.execute("DELETE FROM snapshots WHERE id = ?1;", [record.id.to_string()])?;
        tx.commit()?;

        info!(
            "event=snapshot_delete module=repo status=ok snapshot_id={}",
            record.id
        );
        Ok(())
    }

    fn load_snapshot(&self, name: &str) -> RepoResult<Table> {
        let record = self.require_snapshot(name)?;
        let table = SqliteContext::new(self.conn).read(&record.table_name)?;
        if table.len() != record.row_count {
            return Err(RepoError::InvalidData(format!(
                "snapshot `{}` registered {} rows but holds {}",
                record.name,
                record.row_count,
                table.len()
            )));
        }
        Ok(table)
    }
}

fn normalize_name(name: &str) -> RepoResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return Err(RepoError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(integer) => SqlValue::Integer(*integer),
        Value::Real(real) => SqlValue::Real(*real),
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Json(json) => SqlValue::Text(json.to_string()),
    }
}

fn parse_snapshot_row(row: &Row<'_>) -> RepoResult<SnapshotRecord> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in snapshots.id"))
    })?;

    let row_count: i64 = row.get("row_count")?;
    let row_count = usize::try_from(row_count).map_err(|_| {
        RepoError::InvalidData(format!("invalid row_count `{row_count}` in snapshots"))
    })?;

    let columns_json: String = row.get("columns_json")?;
    let columns: Vec<String> = serde_json::from_str(&columns_json).map_err(|err| {
        RepoError::InvalidData(format!("invalid columns_json in snapshots: {err}"))
    })?;

    Ok(SnapshotRecord {
        id,
        name: row.get("name")?,
        table_name: row.get("table_name")?,
        row_count,
        columns,
        created_at: row.get("created_at")?,
    })
}
