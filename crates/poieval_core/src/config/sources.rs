//! `poi-sources.json` model and validation.
//!
//! # Responsibility
//! - Map each provider and region to a source query plus its attribute columns.
//! - Reject malformed entries at load time instead of at query time.
//!
//! # Invariants
//! - Every provider has at least one region.
//! - Field names are plain SQL identifiers; queries are non-blank.
//! - Lookups are exact on trimmed provider and region names.

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Default configuration file name, resolved relative to the working directory.
pub const DEFAULT_SOURCES_FILE: &str = "poi-sources.json";

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Source table mapping for one provider in one region.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
    /// SQL returning the provider's POIs with `cartodb_id` and geometries.
    pub query: String,
    /// Column holding the street address.
    #[serde(rename = "address")]
    pub address_field: String,
    /// Column holding the POI name.
    #[serde(rename = "name")]
    pub name_field: String,
    /// Column holding the POI category.
    #[serde(rename = "category")]
    pub category_field: String,
}

/// Errors raised while loading or querying source configuration.
#[derive(Debug)]
pub enum SourcesError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Empty,
    EmptyProvider(String),
    EmptyQuery {
        provider: String,
        region: String,
    },
    InvalidField {
        provider: String,
        region: String,
        field: String,
    },
    UnknownProvider(String),
    UnknownRegion {
        provider: String,
        region: String,
    },
}

impl Display for SourcesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read `{path}`: {source}"),
            Self::Parse(err) => write!(f, "invalid sources json: {err}"),
            Self::Empty => write!(f, "sources configuration declares no providers"),
            Self::EmptyProvider(provider) => {
                write!(f, "provider `{provider}` declares no regions")
            }
            Self::EmptyQuery { provider, region } => {
                write!(f, "source query for `{provider}:{region}` is empty")
            }
            Self::InvalidField {
                provider,
                region,
                field,
            } => write!(
                f,
                "field `{field}` for `{provider}:{region}` is not a valid column name"
            ),
            Self::UnknownProvider(provider) => write!(f, "unknown provider `{provider}`"),
            Self::UnknownRegion { provider, region } => {
                write!(f, "provider `{provider}` has no region `{region}`")
            }
        }
    }
}

impl Error for SourcesError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SourcesError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Provider -> region -> source mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PoiSources {
    providers: BTreeMap<String, BTreeMap<String, SourceEntry>>,
}

impl PoiSources {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SourcesError> {
        let sources: Self = serde_json::from_str(json)?;
        sources.validate()?;
        Ok(sources)
    }

    /// Reads, parses and validates the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourcesError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SourcesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let sources = Self::from_json_str(&json)?;
        info!(
            "event=sources_load module=config status=ok providers={}",
            sources.providers.len()
        );
        Ok(sources)
    }

    /// Checks structural invariants of the mapping.
    pub fn validate(&self) -> Result<(), SourcesError> {
        if self.providers.is_empty() {
            return Err(SourcesError::Empty);
        }

        for (provider, regions) in &self.providers {
            if regions.is_empty() {
                return Err(SourcesError::EmptyProvider(provider.clone()));
            }
            for (region, entry) in regions {
                if entry.query.trim().is_empty() {
                    return Err(SourcesError::EmptyQuery {
                        provider: provider.clone(),
                        region: region.clone(),
                    });
                }
                for field in [
                    &entry.address_field,
                    &entry.name_field,
                    &entry.category_field,
                ] {
                    if !FIELD_NAME_RE.is_match(field) {
                        return Err(SourcesError::InvalidField {
                            provider: provider.clone(),
                            region: region.clone(),
                            field: field.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns the entry for `provider` in `region`.
    pub fn entry(&self, provider: &str, region: &str) -> Result<&SourceEntry, SourcesError> {
        let provider = provider.trim();
        let region = region.trim();
        let regions = self
            .providers
            .get(provider)
            .ok_or_else(|| SourcesError::UnknownProvider(provider.to_string()))?;
        regions
            .get(region)
            .ok_or_else(|| SourcesError::UnknownRegion {
                provider: provider.to_string(),
                region: region.to_string(),
            })
    }

    /// Sorted provider names.
    pub fn providers(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Sorted region names for one provider.
    pub fn regions(&self, provider: &str) -> Result<Vec<&str>, SourcesError> {
        let provider = provider.trim();
        self.providers
            .get(provider)
            .map(|regions| regions.keys().map(String::as_str).collect())
            .ok_or_else(|| SourcesError::UnknownProvider(provider.to_string()))
    }
}
