//! Query execution contexts.
//!
//! # Responsibility
//! - Define the seam between SQL-building helpers and the backend that runs them.
//! - Provide the CARTO SQL API backend and a local SQLite backend.
//!
//! # Invariants
//! - Contexts run one statement per call and never retry.
//! - `read` validates table names before any SQL reaches the backend.
//! - SQL text is never written to logs.

use crate::db::DbError;
use crate::model::table::{Table, TableError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod carto;
pub mod sqlite;

pub use carto::{CartoConfig, CartoContext};
pub use sqlite::SqliteContext;

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid table name regex")
});

/// Column names treated as geometries when decoding is requested.
pub const GEOMETRY_COLUMNS: &[&str] = &["the_geom", "the_geom_webmercator"];

pub type ContextResult<T> = Result<T, ContextError>;

/// Error raised by a query context.
#[derive(Debug)]
pub enum ContextError {
    Db(DbError),
    Http(reqwest::Error),
    /// Backend answered with a non-success status.
    Api { status: u16, message: String },
    InvalidResponse(String),
    InvalidTableName(String),
    MissingSetting(&'static str),
    Table(TableError),
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Http(err) => write!(f, "sql api request failed: {err}"),
            Self::Api { status, message } => {
                write!(f, "sql api returned status {status}: {message}")
            }
            Self::InvalidResponse(message) => write!(f, "invalid sql api response: {message}"),
            Self::InvalidTableName(name) => write!(f, "invalid table name `{name}`"),
            Self::MissingSetting(name) => write!(f, "missing required setting `{name}`"),
            Self::Table(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Http(err) => Some(err),
            Self::Table(err) => Some(err),
            Self::Api { .. }
            | Self::InvalidResponse(_)
            | Self::InvalidTableName(_)
            | Self::MissingSetting(_) => None,
        }
    }
}

impl From<DbError> for ContextError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ContextError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<reqwest::Error> for ContextError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<TableError> for ContextError {
    fn from(value: TableError) -> Self {
        Self::Table(value)
    }
}

/// Per-query options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Return geometry columns as decoded GeoJSON (`Value::Json`).
    pub decode_geom: bool,
}

impl QueryOptions {
    pub fn decoded() -> Self {
        Self { decode_geom: true }
    }
}

/// External collaborator that executes SQL and returns tables.
pub trait QueryContext {
    /// Runs one SQL statement with explicit options.
    fn query_with_options(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table>;

    /// Reads an entire table by name.
    fn read(&self, table_name: &str) -> ContextResult<Table>;

    /// Runs one SQL statement with default options.
    fn query(&self, sql: &str) -> ContextResult<Table> {
        self.query_with_options(sql, &QueryOptions::default())
    }
}

impl<C: QueryContext + ?Sized> QueryContext for &C {
    fn query_with_options(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table> {
        (**self).query_with_options(sql, options)
    }

    fn read(&self, table_name: &str) -> ContextResult<Table> {
        (**self).read(table_name)
    }
}

/// Validates a (optionally schema-qualified) table name.
///
/// # Errors
/// - `InvalidTableName` when the name is not a plain SQL identifier.
pub fn validate_table_name(table_name: &str) -> ContextResult<&str> {
    let trimmed = table_name.trim();
    if TABLE_NAME_RE.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(ContextError::InvalidTableName(table_name.to_string()))
    }
}

/// Builds the `SELECT *` statement used by `read` implementations.
pub(crate) fn select_all_sql(table_name: &str) -> ContextResult<String> {
    let name = validate_table_name(table_name)?;
    Ok(format!("SELECT * FROM {name}"))
}

pub(crate) fn is_geometry_column(name: &str) -> bool {
    GEOMETRY_COLUMNS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::{select_all_sql, validate_table_name, ContextError};

    #[test]
    fn table_name_accepts_plain_and_qualified_identifiers() {
        assert_eq!(validate_table_name("nyc_pois").expect("plain"), "nyc_pois");
        assert_eq!(
            validate_table_name(" public.nyc_pois ").expect("qualified"),
            "public.nyc_pois"
        );
    }

    #[test]
    fn table_name_rejects_injection_attempts() {
        for bad in ["", "1table", "pois; DROP TABLE x", "a.b.c", "pois--"] {
            let err = validate_table_name(bad).expect_err("name must be rejected");
            assert!(matches!(err, ContextError::InvalidTableName(_)));
        }
    }

    #[test]
    fn select_all_uses_trimmed_name() {
        assert_eq!(
            select_all_sql(" snap_1 ").expect("valid"),
            "SELECT * FROM snap_1"
        );
    }
}
