//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate configuration lookups and evaluations into use-case level APIs.
//! - Keep the CLI decoupled from SQL and backend details.

use crate::config::sources::SourcesError;
use crate::eval::EvalError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod evaluation_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level failure.
#[derive(Debug)]
pub enum ServiceError {
    /// A `provider:region` reference could not be parsed.
    InvalidReference(String),
    Sources(SourcesError),
    Eval(EvalError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidReference(value) => {
                write!(f, "expected `provider:region`, got `{value}`")
            }
            Self::Sources(err) => write!(f, "{err}"),
            Self::Eval(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidReference(_) => None,
            Self::Sources(err) => Some(err),
            Self::Eval(err) => Some(err),
        }
    }
}

impl From<SourcesError> for ServiceError {
    fn from(value: SourcesError) -> Self {
        Self::Sources(value)
    }
}

impl From<EvalError> for ServiceError {
    fn from(value: EvalError) -> Self {
        Self::Eval(value)
    }
}
