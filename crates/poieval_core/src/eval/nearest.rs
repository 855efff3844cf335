//! Nearest-match query between two POI datasets.
//!
//! For every source point the backend picks the closest target point with the
//! `<->` KNN operator and reports the connecting line and its geodesic length.

use super::{EvalError, EvalResult};
use crate::context::{QueryContext, QueryOptions};
use crate::model::table::Table;
use log::info;

/// Smallest distance (meters) mapped onto the marker scale.
pub const MARKER_MIN_DISTANCE: f64 = 0.277;
/// Largest distance (meters) mapped onto the marker scale.
pub const MARKER_MAX_DISTANCE: f64 = 908.0;

/// Builds the nearest-match SQL for two source queries.
///
/// Output columns: `the_geom`, `the_geom_webmercator` (source-to-target lines),
/// `cartodb_id`, `target_cartodb_id`, `distance` (meters over geography) and
/// `marker_size` (distance rescaled onto 1..10).
pub fn build_nearest_query(source: &str, target: &str) -> String {
    let distance = "ST_Distance(
            geography(source.the_geom),
            geography(target.the_geom)
          )";

    format!(
        "
        SELECT
          ST_MakeLine(source.the_geom, target.the_geom) as the_geom,
          ST_MakeLine(
            source.the_geom_webmercator,
            target.the_geom_webmercator
          ) as the_geom_webmercator,
          source.cartodb_id as cartodb_id,
          target.cartodb_id as target_cartodb_id,
          {distance} as distance,
          9 * (
            {distance} - {MARKER_MIN_DISTANCE}
          ) / ({MARKER_MAX_DISTANCE} - {MARKER_MIN_DISTANCE}) + 1 as marker_size
        FROM (
          SELECT cartodb_id, the_geom, the_geom_webmercator
          FROM ({source}) as _w
        ) as source
        CROSS JOIN LATERAL (
          SELECT cartodb_id, the_geom, the_geom_webmercator
          FROM ({target}) as _w
          ORDER BY source.the_geom_webmercator <-> the_geom_webmercator
          LIMIT 1
        ) as target
    ",
        source = source.trim(),
        target = target.trim(),
    )
}

/// Runs the nearest-match query with geometries decoded.
///
/// # Errors
/// - `EmptyQuery` when either query is blank; nothing is sent to the backend.
/// - `Context` when the backend rejects the query.
pub fn nearest_other<C: QueryContext>(
    source: &str,
    target: &str,
    context: &C,
) -> EvalResult<Table> {
    if source.trim().is_empty() {
        return Err(EvalError::EmptyQuery("source"));
    }
    if target.trim().is_empty() {
        return Err(EvalError::EmptyQuery("target"));
    }

    let sql = build_nearest_query(source, target);
    let table = context.query_with_options(&sql, &QueryOptions::decoded())?;
    info!(
        "event=nearest_other module=eval status=ok rows={}",
        table.len()
    );
    Ok(table)
}

/// Marker size for one distance, matching the SQL `marker_size` column.
pub fn marker_size(distance: f64) -> f64 {
    9.0 * (distance - MARKER_MIN_DISTANCE) / (MARKER_MAX_DISTANCE - MARKER_MIN_DISTANCE) + 1.0
}
