//! SQLite query context for locally stored results.
//!
//! # Responsibility
//! - Run the `QueryContext` contract against a rusqlite connection.
//! - Decode JSON-encoded geometry columns on request.
//!
//! # Invariants
//! - Column order follows the prepared statement.
//! - Blobs are rejected instead of being coerced to text.

use super::{
    is_geometry_column, select_all_sql, ContextError, ContextResult, QueryContext, QueryOptions,
};
use crate::model::table::{Table, Value};
use log::{debug, error};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::time::Instant;

/// Query context over a borrowed SQLite connection.
pub struct SqliteContext<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContext<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn run(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let decode: Vec<bool> = columns
            .iter()
            .map(|column| options.decode_geom && is_geometry_column(column))
            .collect();

        let mut table = Table::new(columns.clone());
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let cell = convert_value(row.get_ref(index)?, column)?;
                cells.push(if decode[index] { decode_geometry(cell) } else { cell });
            }
            table.push_row(cells)?;
        }

        Ok(table)
    }
}

impl QueryContext for SqliteContext<'_> {
    fn query_with_options(&self, sql: &str, options: &QueryOptions) -> ContextResult<Table> {
        let started_at = Instant::now();
        debug!(
            "event=context_query module=context status=start backend=sqlite decode_geom={}",
            options.decode_geom
        );

        match self.run(sql, options) {
            Ok(table) => {
                debug!(
                    "event=context_query module=context status=ok backend=sqlite rows={} duration_ms={}",
                    table.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(table)
            }
            Err(err) => {
                error!(
                    "event=context_query module=context status=error backend=sqlite duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn read(&self, table_name: &str) -> ContextResult<Table> {
        let sql = select_all_sql(table_name)?;
        self.query_with_options(&sql, &QueryOptions::decoded())
    }
}

fn convert_value(value: ValueRef<'_>, column: &str) -> ContextResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(integer) => Ok(Value::Integer(integer)),
        ValueRef::Real(real) => Ok(Value::Real(real)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| Value::Text(text.to_string()))
            .map_err(|_| {
                ContextError::InvalidResponse(format!("column `{column}` holds non-utf8 text"))
            }),
        ValueRef::Blob(_) => Err(ContextError::InvalidResponse(format!(
            "column `{column}` holds a blob; geometries must be stored as GeoJSON text"
        ))),
    }
}

fn decode_geometry(cell: Value) -> Value {
    match cell {
        Value::Text(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) if json.is_object() => Value::Json(json),
            _ => Value::Text(text),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteContext;
    use crate::context::{ContextError, QueryContext, QueryOptions};
    use crate::model::table::Value;
    use rusqlite::Connection;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory sqlite");
        conn.execute_batch(
            "CREATE TABLE nearest (cartodb_id INTEGER, distance REAL, the_geom TEXT);
             INSERT INTO nearest VALUES (1, 10.5, '{\"type\":\"Point\",\"coordinates\":[1,2]}');
             INSERT INTO nearest VALUES (2, NULL, 'not json');",
        )
        .expect("seed rows");
        conn
    }

    #[test]
    fn query_maps_sqlite_types() {
        let conn = seeded();
        let context = SqliteContext::new(&conn);
        let table = context
            .query("SELECT cartodb_id, distance FROM nearest ORDER BY cartodb_id")
            .expect("query should run");

        assert_eq!(table.columns(), ["cartodb_id", "distance"]);
        assert_eq!(table.value(0, "distance"), Some(&Value::Real(10.5)));
        assert_eq!(table.value(1, "distance"), Some(&Value::Null));
    }

    #[test]
    fn decode_geom_only_touches_geometry_json() {
        let conn = seeded();
        let context = SqliteContext::new(&conn);
        let table = context
            .query_with_options(
                "SELECT the_geom FROM nearest ORDER BY cartodb_id",
                &QueryOptions::decoded(),
            )
            .expect("query should run");

        assert!(matches!(table.value(0, "the_geom"), Some(Value::Json(_))));
        assert_eq!(
            table.value(1, "the_geom"),
            Some(&Value::Text("not json".to_string()))
        );

        let raw = context
            .query("SELECT the_geom FROM nearest ORDER BY cartodb_id")
            .expect("query should run");
        assert!(matches!(raw.value(0, "the_geom"), Some(Value::Text(_))));
    }

    #[test]
    fn read_rejects_invalid_table_names() {
        let conn = seeded();
        let context = SqliteContext::new(&conn);
        let err = context
            .read("nearest; DROP TABLE nearest")
            .expect_err("name must be rejected");
        assert!(matches!(err, ContextError::InvalidTableName(_)));
        assert_eq!(context.read("nearest").expect("table exists").len(), 2);
    }

    #[test]
    fn blob_cells_are_rejected() {
        let conn = Connection::open_in_memory().expect("in-memory sqlite");
        let context = SqliteContext::new(&conn);
        let err = context
            .query("SELECT x'00ff' AS the_geom")
            .expect_err("blob must be rejected");
        assert!(matches!(err, ContextError::InvalidResponse(_)));
    }
}
