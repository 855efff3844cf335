//! Tabular result model shared by query contexts and evaluations.
//!
//! # Responsibility
//! - Define the backend-agnostic result set returned by every query context.
//! - Provide typed column accessors used by summary and lookup code.
//!
//! # Invariants
//! - Every row has exactly as many cells as the table has columns.
//! - Column order is the order reported by the backend.

pub mod table;
