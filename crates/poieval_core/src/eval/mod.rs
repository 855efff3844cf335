//! POI dataset evaluations.
//!
//! # Responsibility
//! - Template the nearest-match SQL and run it through a query context.
//! - Aggregate distance statistics and attribute agreement tallies.
//!
//! # Invariants
//! - Spatial work (KNN, geodesic distance) stays in the backend.
//! - Counters always sum to the number of rows processed.

use crate::context::ContextError;
use crate::model::table::TableError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod attributes;
pub mod nearest;
pub mod summary;

pub type EvalResult<T> = Result<T, EvalError>;

/// Evaluation failure.
#[derive(Debug)]
pub enum EvalError {
    /// A source or target query was blank.
    EmptyQuery(&'static str),
    /// The result table has no rows to summarize.
    EmptyResult,
    /// A distance was NaN or infinite.
    NonFiniteDistance { row: usize },
    InvalidThresholds(String),
    Context(ContextError),
    Table(TableError),
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyQuery(side) => write!(f, "{side} query is empty"),
            Self::EmptyResult => write!(f, "result has no rows to evaluate"),
            Self::NonFiniteDistance { row } => write!(f, "row {row}: distance is not finite"),
            Self::InvalidThresholds(message) => write!(f, "invalid thresholds: {message}"),
            Self::Context(err) => write!(f, "{err}"),
            Self::Table(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EvalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Context(err) => Some(err),
            Self::Table(err) => Some(err),
            Self::EmptyQuery(_)
            | Self::EmptyResult
            | Self::NonFiniteDistance { .. }
            | Self::InvalidThresholds(_) => None,
        }
    }
}

impl From<ContextError> for EvalError {
    fn from(value: ContextError) -> Self {
        Self::Context(value)
    }
}

impl From<TableError> for EvalError {
    fn from(value: TableError) -> Self {
        Self::Table(value)
    }
}
