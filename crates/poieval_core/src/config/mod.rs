//! Provider source configuration.
//!
//! # Responsibility
//! - Load the `poi-sources.json` provider/region mapping once, explicitly.
//! - Validate entries before any SQL is templated from them.

pub mod sources;
