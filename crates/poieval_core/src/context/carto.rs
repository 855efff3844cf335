//! CARTO SQL API query context.
//!
//! # Responsibility
//! - Post SQL to the CARTO SQL API (`/api/v2/sql`) and decode JSON/GeoJSON results.
//! - Map API error payloads into `ContextError::Api`.
//!
//! # Invariants
//! - The API key is sent as a form field, never logged.
//! - Column order follows the `fields` object of the response.

use super::{select_all_sql, ContextError, ContextResult, QueryContext, QueryOptions};
use crate::model::table::{Table, Value};
use log::{error, info};
use reqwest::blocking::Client;
use serde_json::Map;
use std::time::{Duration, Instant};

const ENV_USERNAME: &str = "CARTO_USERNAME";
const ENV_API_KEY: &str = "CARTO_API_KEY";
const ENV_BASE_URL: &str = "CARTO_BASE_URL";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const GEOMETRY_COLUMN: &str = "the_geom";

/// Connection settings for a CARTO account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartoConfig {
    pub username: String,
    pub api_key: Option<String>,
    /// Overrides `https://{username}.carto.com`, e.g. for on-premise installs.
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl CartoConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads `CARTO_USERNAME`, `CARTO_API_KEY` and `CARTO_BASE_URL`.
    ///
    /// # Errors
    /// - `MissingSetting` when `CARTO_USERNAME` is unset or blank.
    pub fn from_env() -> ContextResult<Self> {
        let username =
            non_blank_env(ENV_USERNAME).ok_or(ContextError::MissingSetting(ENV_USERNAME))?;
        Ok(Self {
            username,
            api_key: non_blank_env(ENV_API_KEY),
            base_url: non_blank_env(ENV_BASE_URL),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Full SQL API endpoint URL.
    pub fn endpoint(&self) -> String {
        match &self.base_url {
            Some(base) => format!("{}/api/v2/sql", base.trim_end_matches('/')),
            None => format!("https://{}.carto.com/api/v2/sql", self.username),
        }
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Query context backed by the CARTO SQL API.
pub struct CartoContext {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl CartoContext {
    /// Builds a blocking HTTP client for the configured account.
    pub fn new(config: CartoConfig) -> ContextResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("poieval/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint(),
            api_key: config.api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn post(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table> {
        let mut form: Vec<(&str, &str)> = vec![("q", sql)];
        if let Some(api_key) = self.api_key.as_deref() {
            form.push(("api_key", api_key));
        }
        if options.decode_geom {
            form.push(("format", "geojson"));
        }

        let response = self.client.post(&self.endpoint).form(&form).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(ContextError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        if options.decode_geom {
            parse_geojson_response(&body)
        } else {
            parse_json_response(&body)
        }
    }
}

impl QueryContext for CartoContext {
    fn query_with_options(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table> {
        let started_at = Instant::now();
        info!(
            "event=context_query module=context status=start backend=carto decode_geom={}",
            options.decode_geom
        );

        match self.post(sql, options) {
            Ok(table) => {
                info!(
                    "event=context_query module=context status=ok backend=carto rows={} duration_ms={}",
                    table.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(table)
            }
            Err(err) => {
                error!(
                    "event=context_query module=context status=error backend=carto duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn read(&self, table_name: &str) -> ContextResult<Table> {
        let sql = select_all_sql(table_name)?;
        self.query_with_options(&sql, &QueryOptions::default())
    }
}

/// Decodes a `format=json` SQL API body into a table.
pub fn parse_json_response(body: &str) -> ContextResult<Table> {
    let payload: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| ContextError::InvalidResponse(format!("body is not json: {err}")))?;

    let rows = payload
        .get("rows")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| ContextError::InvalidResponse("missing `rows` array".to_string()))?;

    let columns: Vec<String> = match payload.get("fields").and_then(serde_json::Value::as_object) {
        Some(fields) => fields.keys().cloned().collect(),
        None => match rows.first().and_then(serde_json::Value::as_object) {
            Some(first) => first.keys().cloned().collect(),
            None => Vec::new(),
        },
    };

    let mut table = Table::new(columns.clone());
    for (index, row) in rows.iter().enumerate() {
        let object = row.as_object().ok_or_else(|| {
            ContextError::InvalidResponse(format!("row {index} is not an object"))
        })?;
        table.push_row(project_row(object, &columns))?;
    }

    Ok(table)
}

/// Decodes a `format=geojson` SQL API body into a table.
///
/// The feature geometry becomes the leading `the_geom` column.
pub fn parse_geojson_response(body: &str) -> ContextResult<Table> {
    let payload: serde_json::Value = serde_json::from_str(body)
        .map_err(|err| ContextError::InvalidResponse(format!("body is not json: {err}")))?;

    let features = payload
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| ContextError::InvalidResponse("missing `features` array".to_string()))?;

    let mut columns = vec![GEOMETRY_COLUMN.to_string()];
    for feature in features {
        if let Some(properties) = feature.get("properties").and_then(serde_json::Value::as_object) {
            for key in properties.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let empty = Map::new();
    let mut table = Table::new(columns.clone());
    for feature in features {
        let geometry = feature
            .get("geometry")
            .cloned()
            .map_or(Value::Null, |geometry| match geometry {
                serde_json::Value::Null => Value::Null,
                other => Value::Json(other),
            });
        let properties = feature
            .get("properties")
            .and_then(serde_json::Value::as_object)
            .unwrap_or(&empty);

        let mut row = vec![geometry];
        row.extend(project_row(properties, &columns[1..]));
        table.push_row(row)?;
    }

    Ok(table)
}

fn project_row(object: &Map<String, serde_json::Value>, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|column| object.get(column).cloned().map_or(Value::Null, Value::from))
        .collect()
}

/// Extracts a readable message from an SQL API error body.
///
/// The API reports failures as `{"error": ["message", ...]}`; anything else is
/// returned trimmed as-is.
pub fn api_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_payload = parsed.as_ref().and_then(|payload| match payload.get("error") {
        Some(serde_json::Value::Array(messages)) => Some(
            messages
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        Some(serde_json::Value::String(message)) => Some(message.clone()),
        _ => None,
    });

    match from_payload {
        Some(message) if !message.is_empty() => message,
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{api_error_message, parse_geojson_response, parse_json_response, CartoConfig};
    use crate::context::ContextError;
    use crate::model::table::Value;

    #[test]
    fn endpoint_defaults_to_user_subdomain() {
        let config = CartoConfig::new("acme");
        assert_eq!(config.endpoint(), "https://acme.carto.com/api/v2/sql");

        let mut custom = CartoConfig::new("acme");
        custom.base_url = Some("https://carto.internal/user/acme/".to_string());
        assert_eq!(
            custom.endpoint(),
            "https://carto.internal/user/acme/api/v2/sql"
        );
    }

    #[test]
    fn json_response_keeps_field_order() {
        let body = r#"{
            "rows": [
                {"distance": 12.5, "cartodb_id": 1, "target_cartodb_id": 9},
                {"distance": null, "cartodb_id": 2, "target_cartodb_id": 4}
            ],
            "time": 0.01,
            "fields": {
                "cartodb_id": {"type": "number"},
                "target_cartodb_id": {"type": "number"},
                "distance": {"type": "number"}
            },
            "total_rows": 2
        }"#;

        let table = parse_json_response(body).expect("valid response");
        assert_eq!(table.columns(), ["cartodb_id", "target_cartodb_id", "distance"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "distance"), Some(&Value::Real(12.5)));
        assert_eq!(table.value(1, "distance"), Some(&Value::Null));
        assert_eq!(table.value(1, "target_cartodb_id"), Some(&Value::Integer(4)));
    }

    #[test]
    fn json_response_without_rows_is_invalid() {
        let err = parse_json_response(r#"{"total_rows": 0}"#).expect_err("rows are required");
        assert!(matches!(err, ContextError::InvalidResponse(_)));
    }

    #[test]
    fn geojson_response_puts_geometry_first() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
                    "properties": {"cartodb_id": 3, "distance": 140.2}
                }
            ]
        }"#;

        let table = parse_geojson_response(body).expect("valid feature collection");
        assert_eq!(table.columns(), ["the_geom", "cartodb_id", "distance"]);
        assert!(matches!(table.value(0, "the_geom"), Some(Value::Json(_))));
        assert_eq!(table.value(0, "cartodb_id"), Some(&Value::Integer(3)));
    }

    #[test]
    fn api_error_message_joins_error_array() {
        let body = r#"{"error": ["relation \"nope\" does not exist"]}"#;
        assert_eq!(api_error_message(body), "relation \"nope\" does not exist");
        assert_eq!(api_error_message("  gateway timeout \n"), "gateway timeout");
    }
}
