#![allow(dead_code)]

use poieval_core::{ContextResult, QueryContext, QueryOptions, Table, Value};
use std::cell::RefCell;

/// Scripted query context: answers each SQL string through `respond` and
/// records every call.
pub struct MockContext {
    respond: Box<dyn Fn(&str) -> ContextResult<Table>>,
    pub calls: RefCell<Vec<(String, QueryOptions)>>,
}

impl MockContext {
    pub fn new(respond: impl Fn(&str) -> ContextResult<Table> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl QueryContext for MockContext {
    fn query_with_options(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table> {
        self.calls.borrow_mut().push((sql.to_string(), *options));
        (self.respond)(sql)
    }

    fn read(&self, table_name: &str) -> ContextResult<Table> {
        self.query(&format!("SELECT * FROM {table_name}"))
    }
}

/// Nearest-match table with `(cartodb_id, target_cartodb_id, distance)` rows.
pub fn nearest_table(rows: &[(i64, i64, f64)]) -> Table {
    let mut table = Table::new([
        "the_geom",
        "cartodb_id",
        "target_cartodb_id",
        "distance",
        "marker_size",
    ]);
    for &(id, target_id, distance) in rows {
        table
            .push_row(vec![
                Value::Json(serde_json::json!({
                    "type": "LineString",
                    "coordinates": [[-73.98, 40.75], [-73.97, 40.76]]
                })),
                Value::Integer(id),
                Value::Integer(target_id),
                Value::Real(distance),
                Value::Real(poieval_core::eval::nearest::marker_size(distance)),
            ])
            .unwrap();
    }
    table
}

/// Single-row attribute lookup result.
pub fn attribute_row(name: Option<&str>, address: Option<&str>, category: Option<&str>) -> Table {
    let text = |value: Option<&str>| value.map_or(Value::Null, |v| Value::Text(v.to_string()));
    let mut table = Table::new(["name", "address", "category"]);
    table
        .push_row(vec![text(name), text(address), text(category)])
        .unwrap();
    table
}

pub const SOURCES_JSON: &str = r#"{
    "safegraph": {
        "nyc": {
            "query": "SELECT * FROM safegraph_nyc",
            "address": "street_address",
            "name": "location_name",
            "category": "top_category"
        }
    },
    "osm": {
        "nyc": {
            "query": "SELECT * FROM osm_pois_nyc",
            "address": "addr_full",
            "name": "name",
            "category": "amenity"
        }
    }
}"#;
