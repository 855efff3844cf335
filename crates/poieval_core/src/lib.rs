//! Helpers for comparing points-of-interest datasets in a geospatial SQL backend.
//!
//! Spatial work (KNN search, geodesic distance) runs in the backend; this crate
//! templates the SQL, walks the returned rows and aggregates statistics.

pub mod config;
pub mod context;
pub mod db;
pub mod eval;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::sources::{PoiSources, SourceEntry, SourcesError, DEFAULT_SOURCES_FILE};
pub use context::{
    CartoConfig, CartoContext, ContextError, ContextResult, QueryContext, QueryOptions,
    SqliteContext,
};
pub use eval::attributes::{
    compare_attributes, AttributeReport, AttributeTally, MatchOutcome, PoiAttributes,
    RowComparison,
};
pub use eval::nearest::{build_nearest_query, nearest_other};
pub use eval::summary::{
    eval_nearest, eval_nearest_with, summarize_distances, DistanceThresholds, NearestSummary,
};
pub use eval::{EvalError, EvalResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::table::{Table, TableError, Value};
pub use repo::snapshot_repo::{
    RepoError, RepoResult, SnapshotId, SnapshotRecord, SnapshotRepository,
    SqliteSnapshotRepository,
};
pub use service::evaluation_service::{
    ComparisonReport, ComparisonRequest, EvaluationService, ProviderRef,
};
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
