//! Repository layer for locally stored evaluation results.
//!
//! # Responsibility
//! - Define snapshot storage contracts.
//! - Keep SQLite details out of the service and CLI layers.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateName`) in
//!   addition to DB transport errors.

pub mod snapshot_repo;
