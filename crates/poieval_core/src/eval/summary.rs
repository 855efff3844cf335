//! Distance summary statistics for nearest-match results.
//!
//! # Invariants
//! - `above_far + within_far == total`, so the two percentages sum to 100.
//! - `within_close + misses == total`.
//! - `within_close <= within_far` whenever `close_meters <= far_meters`.

use super::{EvalError, EvalResult};
use crate::model::table::Table;
use std::fmt::{Display, Formatter};

/// Column read by [`eval_nearest`].
pub const DISTANCE_COLUMN: &str = "distance";

/// Distance cut-offs in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceThresholds {
    /// Beyond this distance a nearest neighbor is considered far away.
    pub far_meters: f64,
    /// At or below this distance a nearest neighbor is considered the same place.
    pub close_meters: f64,
}

impl Default for DistanceThresholds {
    fn default() -> Self {
        Self {
            far_meters: 150.0,
            close_meters: 25.0,
        }
    }
}

impl DistanceThresholds {
    /// # Errors
    /// - `InvalidThresholds` for negative/non-finite values or `close > far`.
    pub fn validate(&self) -> EvalResult<()> {
        if !self.far_meters.is_finite() || !self.close_meters.is_finite() {
            return Err(EvalError::InvalidThresholds(
                "thresholds must be finite".to_string(),
            ));
        }
        if self.close_meters < 0.0 || self.far_meters < 0.0 {
            return Err(EvalError::InvalidThresholds(
                "thresholds must not be negative".to_string(),
            ));
        }
        if self.close_meters > self.far_meters {
            return Err(EvalError::InvalidThresholds(format!(
                "close ({}) must not exceed far ({})",
                self.close_meters, self.far_meters
            )));
        }
        Ok(())
    }
}

/// Counts behind the printed percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestSummary {
    pub thresholds: DistanceThresholds,
    pub total: usize,
    pub above_far: usize,
    pub within_far: usize,
    pub within_close: usize,
    /// Rows whose nearest neighbor is farther than `close_meters`.
    pub misses: usize,
}

impl NearestSummary {
    pub fn perc_above(&self) -> f64 {
        percentage(self.above_far, self.total)
    }

    pub fn perc_below(&self) -> f64 {
        percentage(self.within_far, self.total)
    }

    pub fn perc_close(&self) -> f64 {
        percentage(self.within_close, self.total)
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * count as f64 / total as f64
}

impl Display for NearestSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let far = self.thresholds.far_meters;
        let close = self.thresholds.close_meters;
        writeln!(f, "> {far} meters: {:.2}%", self.perc_above())?;
        writeln!(f, "<= {far} meters: {:.2}%", self.perc_below())?;
        writeln!(f, "<= {close} meters: {:.2}%", self.perc_close())?;
        write!(f, "num misses: {}", self.misses)
    }
}

/// Tallies raw distances against thresholds.
///
/// # Errors
/// - `EmptyResult` when `distances` is empty.
/// - `NonFiniteDistance` on the first NaN or infinite distance.
/// - `InvalidThresholds` when thresholds fail validation.
pub fn summarize_distances(
    distances: &[f64],
    thresholds: DistanceThresholds,
) -> EvalResult<NearestSummary> {
    thresholds.validate()?;
    if distances.is_empty() {
        return Err(EvalError::EmptyResult);
    }
    if let Some(row) = distances.iter().position(|distance| !distance.is_finite()) {
        return Err(EvalError::NonFiniteDistance { row });
    }

    let mut summary = NearestSummary {
        thresholds,
        total: distances.len(),
        above_far: 0,
        within_far: 0,
        within_close: 0,
        misses: 0,
    };

    for &distance in distances {
        if distance > thresholds.far_meters {
            summary.above_far += 1;
        } else {
            summary.within_far += 1;
        }
        if distance <= thresholds.close_meters {
            summary.within_close += 1;
        } else {
            summary.misses += 1;
        }
    }

    Ok(summary)
}

/// Summarizes the `distance` column with default thresholds.
pub fn eval_nearest(nearest: &Table) -> EvalResult<NearestSummary> {
    eval_nearest_with(nearest, DistanceThresholds::default())
}

/// Summarizes the `distance` column with explicit thresholds.
///
/// # Errors
/// - `Table` when the column is missing or holds null/non-numeric cells.
/// - `EmptyResult` when the table has no rows.
pub fn eval_nearest_with(
    nearest: &Table,
    thresholds: DistanceThresholds,
) -> EvalResult<NearestSummary> {
    let distances = nearest.f64_column(DISTANCE_COLUMN)?;
    summarize_distances(&distances, thresholds)
}
