//! Provider comparison use-cases.
//!
//! # Responsibility
//! - Resolve `provider:region` references through the loaded source mapping.
//! - Chain nearest-match, summary and attribute evaluations for callers.
//!
//! # Invariants
//! - The service never templates SQL itself; it delegates to `eval`.
//! - Unknown providers or regions fail before any backend call.

use crate::config::sources::{PoiSources, SourceEntry, SourcesError};
use crate::context::QueryContext;
use crate::eval::attributes::{compare_attributes, AttributeReport, DEFAULT_MAX_MATCH_DISTANCE};
use crate::eval::nearest::nearest_other;
use crate::eval::summary::{eval_nearest_with, DistanceThresholds, NearestSummary};
use crate::eval::EvalError;
use crate::model::table::Table;
use super::{ServiceError, ServiceResult};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Reference to one provider dataset in one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRef {
    pub provider: String,
    pub region: String,
}

impl ProviderRef {
    pub fn new(provider: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            region: region.into(),
        }
    }
}

impl FromStr for ProviderRef {
    type Err = ServiceError;

    /// Parses `provider:region`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ServiceError::InvalidReference(value.to_string());
        let (provider, region) = value.split_once(':').ok_or_else(invalid)?;
        let provider = provider.trim();
        let region = region.trim();
        if provider.is_empty() || region.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(provider, region))
    }
}

impl Display for ProviderRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.region)
    }
}

/// Input for a full provider comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRequest {
    pub from: ProviderRef,
    pub to: ProviderRef,
    pub thresholds: DistanceThresholds,
    /// Also run the per-row attribute lookup loop.
    pub with_attributes: bool,
    pub max_match_distance: f64,
}

impl ComparisonRequest {
    /// Creates a request with default thresholds and no attribute lookups.
    pub fn new(from: ProviderRef, to: ProviderRef) -> Self {
        Self {
            from,
            to,
            thresholds: DistanceThresholds::default(),
            with_attributes: false,
            max_match_distance: DEFAULT_MAX_MATCH_DISTANCE,
        }
    }
}

/// Everything produced by one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonReport {
    pub nearest: Table,
    pub summary: NearestSummary,
    pub attributes: Option<AttributeReport>,
}

/// Use-case service over a query context and a loaded source mapping.
pub struct EvaluationService<C: QueryContext> {
    context: C,
    sources: PoiSources,
}

impl<C: QueryContext> EvaluationService<C> {
    pub fn new(context: C, sources: PoiSources) -> Self {
        Self { context, sources }
    }

    pub fn sources(&self) -> &PoiSources {
        &self.sources
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    fn entry(&self, reference: &ProviderRef) -> Result<&SourceEntry, SourcesError> {
        self.sources.entry(&reference.provider, &reference.region)
    }

    /// Nearest `to` neighbor for every POI of `from`.
    pub fn nearest_between(&self, from: &ProviderRef, to: &ProviderRef) -> ServiceResult<Table> {
        let source = self.entry(from)?;
        let target = self.entry(to)?;
        Ok(nearest_other(&source.query, &target.query, &self.context)?)
    }

    /// Distance summary of a nearest-match table.
    pub fn summarize(
        &self,
        nearest: &Table,
        thresholds: DistanceThresholds,
    ) -> ServiceResult<NearestSummary> {
        Ok(eval_nearest_with(nearest, thresholds)?)
    }

    /// Attribute lookup loop over a nearest-match table.
    pub fn compare_attributes(
        &self,
        nearest: &Table,
        from: &ProviderRef,
        to: &ProviderRef,
        max_distance: f64,
    ) -> ServiceResult<AttributeReport> {
        let source = self.entry(from)?;
        let target = self.entry(to)?;
        Ok(compare_attributes(
            &self.context,
            nearest,
            source,
            target,
            max_distance,
        )?)
    }

    /// Runs nearest-match, summary and (optionally) attribute lookups.
    ///
    /// # Errors
    /// - `EmptyResult` when the source dataset produced no nearest rows.
    pub fn evaluate(&self, request: &ComparisonRequest) -> ServiceResult<ComparisonReport> {
        request.thresholds.validate()?;
        let nearest = self.nearest_between(&request.from, &request.to)?;
        if nearest.is_empty() {
            return Err(EvalError::EmptyResult.into());
        }

        let summary = self.summarize(&nearest, request.thresholds)?;
        let attributes = if request.with_attributes {
            Some(self.compare_attributes(
                &nearest,
                &request.from,
                &request.to,
                request.max_match_distance,
            )?)
        } else {
            None
        };

        Ok(ComparisonReport {
            nearest,
            summary,
            attributes,
        })
    }
}
