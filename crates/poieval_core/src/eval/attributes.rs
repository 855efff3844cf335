//! Per-row attribute lookups over a nearest-match result.
//!
//! # Responsibility
//! - For each matched pair, fetch name/address/category from both providers.
//! - Classify the pair as hit, miss or too far and keep running tallies.
//!
//! # Invariants
//! - Rows are processed in table order, one lookup query at a time.
//! - Pairs farther than the match distance issue no lookup queries.
//! - `hits + misses + too_far` equals the number of rows processed.

use super::summary::DISTANCE_COLUMN;
use super::{EvalError, EvalResult};
use crate::config::sources::SourceEntry;
use crate::context::QueryContext;
use crate::model::table::{Table, Value};
use log::{debug, info};
use std::fmt::{Display, Formatter};

pub const SOURCE_ID_COLUMN: &str = "cartodb_id";
pub const TARGET_ID_COLUMN: &str = "target_cartodb_id";
/// Default maximum distance (meters) for a pair to be looked up at all.
pub const DEFAULT_MAX_MATCH_DISTANCE: f64 = 150.0;

/// Classification of one matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Hit,
    Miss,
    TooFar,
}

impl MatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::TooFar => "too_far",
        }
    }
}

/// Descriptive attributes of one POI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoiAttributes {
    pub name: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
}

/// Outcome for one row of the nearest table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowComparison {
    pub cartodb_id: i64,
    pub target_cartodb_id: i64,
    pub distance: f64,
    /// `None` when the pair was too far to look up or the row was not found.
    pub source: Option<PoiAttributes>,
    pub target: Option<PoiAttributes>,
    pub outcome: MatchOutcome,
    pub category_match: bool,
}

/// Running counters over processed rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeTally {
    pub hits: usize,
    pub misses: usize,
    pub too_far: usize,
    /// Hits whose categories also agree.
    pub category_matches: usize,
}

impl AttributeTally {
    pub fn total(&self) -> usize {
        self.hits + self.misses + self.too_far
    }

    fn record(&mut self, comparison: &RowComparison) {
        match comparison.outcome {
            MatchOutcome::Hit => self.hits += 1,
            MatchOutcome::Miss => self.misses += 1,
            MatchOutcome::TooFar => self.too_far += 1,
        }
        if comparison.category_match {
            self.category_matches += 1;
        }
    }
}

/// Per-row comparisons plus the totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeReport {
    pub rows: Vec<RowComparison>,
    pub tally: AttributeTally,
}

impl Display for AttributeReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for row in &self.rows {
            let category = |attributes: &Option<PoiAttributes>| {
                attributes
                    .as_ref()
                    .and_then(|value| value.category.clone())
                    .unwrap_or_else(|| "-".to_string())
            };
            writeln!(
                f,
                "{} -> {}: {:.1} m {} [{} / {}]",
                row.cartodb_id,
                row.target_cartodb_id,
                row.distance,
                row.outcome.as_str(),
                category(&row.source),
                category(&row.target),
            )?;
        }
        writeln!(f, "hits: {}", self.tally.hits)?;
        writeln!(f, "misses: {}", self.tally.misses)?;
        writeln!(f, "too far: {}", self.tally.too_far)?;
        write!(f, "category matches: {}", self.tally.category_matches)
    }
}

/// Builds the single-row attribute lookup for one POI id.
pub fn build_lookup_query(entry: &SourceEntry, cartodb_id: i64) -> String {
    format!(
        "SELECT {name} AS name, {address} AS address, {category} AS category \
         FROM ({query}) AS _w WHERE cartodb_id = {cartodb_id} LIMIT 1",
        name = entry.name_field,
        address = entry.address_field,
        category = entry.category_field,
        query = entry.query.trim(),
    )
}

/// Fetches attributes for one POI; `None` when the id is not present.
pub fn lookup_attributes<C: QueryContext>(
    context: &C,
    entry: &SourceEntry,
    cartodb_id: i64,
) -> EvalResult<Option<PoiAttributes>> {
    let table = context.query(&build_lookup_query(entry, cartodb_id))?;
    if table.is_empty() {
        return Ok(None);
    }

    let text = |column: &str| table.value(0, column).and_then(cell_text);
    Ok(Some(PoiAttributes {
        name: text("name"),
        address: text("address"),
        category: text("category"),
    }))
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Lowercases, drops punctuation and collapses whitespace.
///
/// Returns `None` when nothing comparable remains.
pub fn normalize_text(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn same_text(left: Option<&str>, right: Option<&str>) -> bool {
    match (left.and_then(normalize_text), right.and_then(normalize_text)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Hit when names or addresses agree after normalization.
pub fn classify(source: Option<&PoiAttributes>, target: Option<&PoiAttributes>) -> MatchOutcome {
    let (Some(source), Some(target)) = (source, target) else {
        return MatchOutcome::Miss;
    };

    if same_text(source.name.as_deref(), target.name.as_deref())
        || same_text(source.address.as_deref(), target.address.as_deref())
    {
        MatchOutcome::Hit
    } else {
        MatchOutcome::Miss
    }
}

/// Walks a nearest-match table and compares attributes pair by pair.
///
/// # Errors
/// - `InvalidThresholds` when `max_distance` is negative or not finite.
/// - `Table` when id or distance columns are missing or malformed.
/// - `Context` when any lookup query fails; processing stops at that row.
pub fn compare_attributes<C: QueryContext>(
    context: &C,
    nearest: &Table,
    source: &SourceEntry,
    target: &SourceEntry,
    max_distance: f64,
) -> EvalResult<AttributeReport> {
    if !max_distance.is_finite() || max_distance < 0.0 {
        return Err(EvalError::InvalidThresholds(format!(
            "max match distance must be a non-negative number, got {max_distance}"
        )));
    }

    let source_ids = nearest.i64_column(SOURCE_ID_COLUMN)?;
    let target_ids = nearest.i64_column(TARGET_ID_COLUMN)?;
    let distances = nearest.f64_column(DISTANCE_COLUMN)?;

    let mut report = AttributeReport::default();
    for ((cartodb_id, target_cartodb_id), distance) in
        source_ids.into_iter().zip(target_ids).zip(distances)
    {
        let comparison = if !distance.is_finite() || distance > max_distance {
            RowComparison {
                cartodb_id,
                target_cartodb_id,
                distance,
                source: None,
                target: None,
                outcome: MatchOutcome::TooFar,
                category_match: false,
            }
        } else {
            let source_attributes = lookup_attributes(context, source, cartodb_id)?;
            let target_attributes = lookup_attributes(context, target, target_cartodb_id)?;
            let outcome = classify(source_attributes.as_ref(), target_attributes.as_ref());
            let category_match = outcome == MatchOutcome::Hit
                && same_text(
                    source_attributes
                        .as_ref()
                        .and_then(|value| value.category.as_deref()),
                    target_attributes
                        .as_ref()
                        .and_then(|value| value.category.as_deref()),
                );
            RowComparison {
                cartodb_id,
                target_cartodb_id,
                distance,
                source: source_attributes,
                target: target_attributes,
                outcome,
                category_match,
            }
        };

        debug!(
            "event=attribute_compare module=eval cartodb_id={} target_cartodb_id={} outcome={}",
            comparison.cartodb_id,
            comparison.target_cartodb_id,
            comparison.outcome.as_str()
        );
        report.tally.record(&comparison);
        report.rows.push(comparison);
    }

    info!(
        "event=attribute_compare module=eval status=ok rows={} hits={} misses={} too_far={}",
        report.tally.total(),
        report.tally.hits,
        report.tally.misses,
        report.tally.too_far
    );
    Ok(report)
}
