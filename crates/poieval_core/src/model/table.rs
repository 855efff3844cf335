//! Result table and cell values.
//!
//! # Responsibility
//! - Hold query results as ordered columns plus rows of dynamically typed cells.
//! - Convert columns into numeric vectors for statistics.
//!
//! # Invariants
//! - `push_row` rejects rows whose width differs from the column count.
//! - Numeric accessors never silently skip null or non-numeric cells.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// One cell of a result table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Decoded geometry (GeoJSON) or any nested JSON value.
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the numeric value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer value; reals are accepted only without a fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.fract() == 0.0 && value.is_finite() => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Integer(i64::from(flag)),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(integer) => Self::Integer(integer),
                None => number.as_f64().map_or(Self::Null, Self::Real),
            },
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

pub type TableResult<T> = Result<T, TableError>;

/// Shape and typing errors raised by table accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    MissingColumn(String),
    RowWidth { expected: usize, actual: usize },
    InvalidValue {
        column: String,
        row: usize,
        message: String,
    },
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(name) => write!(f, "result has no column `{name}`"),
            Self::RowWidth { expected, actual } => {
                write!(f, "row has {actual} cells, table has {expected} columns")
            }
            Self::InvalidValue {
                column,
                row,
                message,
            } => write!(f, "invalid value in `{column}` at row {row}: {message}"),
        }
    }
}

impl Error for TableError {}

/// Ordered columns plus rows of cells, as returned by a query context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates an empty table with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends one row.
    ///
    /// # Errors
    /// - `RowWidth` when `row.len()` differs from the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> TableResult<()> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Returns one cell by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    /// Reads a whole column as `f64`, widening integers.
    ///
    /// # Errors
    /// - `MissingColumn` when the column does not exist.
    /// - `InvalidValue` on the first null or non-numeric cell.
    pub fn f64_column(&self, name: &str) -> TableResult<Vec<f64>> {
        self.typed_column(name, "number", Value::as_f64)
    }

    /// Reads a whole column as `i64`.
    ///
    /// # Errors
    /// - `MissingColumn` when the column does not exist.
    /// - `InvalidValue` on the first cell that is not an integral number.
    pub fn i64_column(&self, name: &str) -> TableResult<Vec<i64>> {
        self.typed_column(name, "integer", Value::as_i64)
    }

    fn typed_column<T>(
        &self,
        name: &str,
        expected: &str,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> TableResult<Vec<T>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;

        self.rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| {
                let cell = &row[index];
                convert(cell).ok_or_else(|| TableError::InvalidValue {
                    column: name.to_string(),
                    row: row_index,
                    message: format!("expected {expected}, found {}", cell.kind()),
                })
            })
            .collect()
    }
}
