mod common;

use common::{nearest_table, MockContext};
use poieval_core::{
    eval_nearest, eval_nearest_with, nearest_other, ContextError, DistanceThresholds, EvalError,
    Table, TableError, Value,
};

#[test]
fn nearest_other_sends_templated_sql_with_geometry_decoding() {
    let context = MockContext::new(|_| Ok(nearest_table(&[(1, 7, 12.0), (2, 9, 300.0)])));

    let table = nearest_other(
        "SELECT * FROM safegraph_nyc",
        "SELECT * FROM osm_pois_nyc",
        &context,
    )
    .unwrap();

    assert_eq!(table.len(), 2);
    let calls = context.calls.borrow();
    assert_eq!(calls.len(), 1);
    let (sql, options) = &calls[0];
    assert!(options.decode_geom);
    assert!(sql.contains("FROM (SELECT * FROM safegraph_nyc) as _w"));
    assert!(sql.contains("FROM (SELECT * FROM osm_pois_nyc) as _w"));
    assert!(sql.contains("<->"));
}

#[test]
fn nearest_other_rejects_blank_queries_without_calling_backend() {
    let context = MockContext::new(|_| Ok(Table::default()));

    let err = nearest_other("  ", "SELECT 1", &context).unwrap_err();
    assert!(matches!(err, EvalError::EmptyQuery("source")));
    let err = nearest_other("SELECT 1", "", &context).unwrap_err();
    assert!(matches!(err, EvalError::EmptyQuery("target")));
    assert_eq!(context.call_count(), 0);
}

#[test]
fn nearest_other_propagates_backend_errors() {
    let context = MockContext::new(|_| {
        Err(ContextError::Api {
            status: 400,
            message: "relation \"osm_pois_nyc\" does not exist".to_string(),
        })
    });

    let err = nearest_other("SELECT 1", "SELECT 2", &context).unwrap_err();
    match err {
        EvalError::Context(ContextError::Api { status, .. }) => assert_eq!(status, 400),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn eval_nearest_counts_sum_to_row_count() {
    let table = nearest_table(&[
        (1, 11, 3.2),
        (2, 12, 24.9),
        (3, 13, 60.0),
        (4, 14, 150.0),
        (5, 15, 151.0),
        (6, 16, 1200.0),
    ]);

    let summary = eval_nearest(&table).unwrap();

    assert_eq!(summary.total, 6);
    assert_eq!(summary.above_far + summary.within_far, 6);
    assert_eq!(summary.within_close + summary.misses, 6);
    assert_eq!(summary.above_far, 2);
    assert_eq!(summary.within_close, 2);
    assert_eq!(summary.misses, 4);
    assert!((summary.perc_above() + summary.perc_below() - 100.0).abs() < 1e-9);
    assert_eq!(
        summary.to_string(),
        "> 150 meters: 33.33%\n<= 150 meters: 66.67%\n<= 25 meters: 33.33%\nnum misses: 4"
    );
}

#[test]
fn eval_nearest_with_custom_thresholds_changes_labels() {
    let table = nearest_table(&[(1, 2, 40.0), (3, 4, 90.0)]);
    let thresholds = DistanceThresholds {
        far_meters: 50.0,
        close_meters: 10.0,
    };

    let summary = eval_nearest_with(&table, thresholds).unwrap();
    let rendered = summary.to_string();
    assert!(rendered.starts_with("> 50 meters: 50.00%"));
    assert!(rendered.contains("<= 10 meters: 0.00%"));
    assert_eq!(summary.misses, 2);
}

#[test]
fn eval_nearest_rejects_empty_results() {
    let err = eval_nearest(&nearest_table(&[])).unwrap_err();
    assert!(matches!(err, EvalError::EmptyResult));
}

#[test]
fn eval_nearest_rejects_null_distances() {
    let mut table = Table::new(["cartodb_id", "distance"]);
    table
        .push_row(vec![Value::Integer(1), Value::Real(5.0)])
        .unwrap();
    table.push_row(vec![Value::Integer(2), Value::Null]).unwrap();

    let err = eval_nearest(&table).unwrap_err();
    match err {
        EvalError::Table(TableError::InvalidValue { row, .. }) => assert_eq!(row, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn eval_nearest_rejects_nan_distances() {
    let err = eval_nearest(&nearest_table(&[(1, 11, 5.0), (2, 12, f64::NAN)])).unwrap_err();
    assert!(matches!(err, EvalError::NonFiniteDistance { row: 1 }));
}

#[test]
fn eval_nearest_requires_distance_column() {
    let table = Table::new(["cartodb_id"]);
    let err = eval_nearest(&table).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Table(TableError::MissingColumn(ref column)) if column == "distance"
    ));
}
