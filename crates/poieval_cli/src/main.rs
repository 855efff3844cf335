//! `poieval` console entry point.
//!
//! # Responsibility
//! - Parse arguments, load provider configuration once, and dispatch commands.
//! - Print summaries to stdout; report failures on stderr with a non-zero exit.

mod args;

use args::{Cli, Command, GlobalOptions};
use clap::Parser;
use log::info;
use poieval_core::db::open_db;
use poieval_core::{
    default_log_level, eval_nearest, eval_nearest_with, init_logging, CartoConfig, CartoContext,
    ComparisonReport, ComparisonRequest, DistanceThresholds, EvaluationService, PoiSources,
    ProviderRef, QueryContext, SnapshotRepository, SqliteSnapshotRepository,
};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Executes one command and returns what it prints on success.
fn run(cli: Cli) -> Result<String, String> {
    setup_logging(&cli.global)?;
    let thresholds = cli.command.thresholds();

    match cli.command {
        Command::Version => Ok(format!("poieval {}", poieval_core::core_version())),
        Command::Providers => render_providers(&load_sources(&cli.global)?),
        Command::Nearest { from, to, save, db } => {
            let service = carto_service(&cli.global)?;
            run_nearest(&service, &from, &to, save.as_deref(), &db)
        }
        Command::Compare {
            from,
            to,
            max_distance,
        } => {
            let service = carto_service(&cli.global)?;
            run_compare(&service, from, to, max_distance)
        }
        Command::Eval { snapshot, db, .. } => run_eval(&db, &snapshot, thresholds),
        Command::Snapshots { db } => render_snapshots(&db),
    }
}

fn render_providers(sources: &PoiSources) -> Result<String, String> {
    let mut lines = Vec::new();
    for provider in sources.providers() {
        let regions = sources.regions(provider).map_err(|err| err.to_string())?;
        lines.push(format!("{provider}: {}", regions.join(", ")));
    }
    Ok(lines.join("\n"))
}

fn run_nearest<C: QueryContext>(
    service: &EvaluationService<C>,
    from: &ProviderRef,
    to: &ProviderRef,
    save: Option<&str>,
    db: &Path,
) -> Result<String, String> {
    let nearest = service
        .nearest_between(from, to)
        .map_err(|err| err.to_string())?;

    let mut lines = vec![format!("nearest {to} for each {from}: {} rows", nearest.len())];
    if !nearest.is_empty() {
        let summary = eval_nearest(&nearest).map_err(|err| err.to_string())?;
        lines.push(summary.to_string());
    }

    if let Some(name) = save {
        let conn = open_db(db).map_err(|err| err.to_string())?;
        let id = SqliteSnapshotRepository::new(&conn)
            .save_snapshot(name, &nearest)
            .map_err(|err| err.to_string())?;
        lines.push(format!("saved snapshot `{name}` ({id}) to {}", db.display()));
    }
    Ok(lines.join("\n"))
}

fn run_compare<C: QueryContext>(
    service: &EvaluationService<C>,
    from: ProviderRef,
    to: ProviderRef,
    max_distance: f64,
) -> Result<String, String> {
    let mut request = ComparisonRequest::new(from, to);
    request.with_attributes = true;
    request.max_match_distance = max_distance;

    let report = service.evaluate(&request).map_err(|err| err.to_string())?;
    Ok(render_comparison(&report))
}

/// Attribute report (when present), a blank line, then the distance summary.
fn render_comparison(report: &ComparisonReport) -> String {
    match &report.attributes {
        Some(attributes) => format!("{attributes}\n\n{}", report.summary),
        None => report.summary.to_string(),
    }
}

fn run_eval(db: &Path, snapshot: &str, thresholds: DistanceThresholds) -> Result<String, String> {
    let conn = open_db(db).map_err(|err| err.to_string())?;
    let table = SqliteSnapshotRepository::new(&conn)
        .load_snapshot(snapshot)
        .map_err(|err| err.to_string())?;
    let summary = eval_nearest_with(&table, thresholds).map_err(|err| err.to_string())?;
    Ok(summary.to_string())
}

fn render_snapshots(db: &Path) -> Result<String, String> {
    let conn = open_db(db).map_err(|err| err.to_string())?;
    let snapshots = SqliteSnapshotRepository::new(&conn)
        .list_snapshots()
        .map_err(|err| err.to_string())?;
    if snapshots.is_empty() {
        return Ok(format!("no snapshots in {}", db.display()));
    }

    Ok(snapshots
        .iter()
        .map(|record| {
            format!(
                "{}\t{} rows\tcreated_at={}\tid={}",
                record.name, record.row_count, record.created_at, record.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

fn carto_service(global: &GlobalOptions) -> Result<EvaluationService<CartoContext>, String> {
    let sources = load_sources(global)?;
    let config = CartoConfig::from_env().map_err(|err| err.to_string())?;
    let context = CartoContext::new(config).map_err(|err| err.to_string())?;
    info!(
        "event=cli_context module=cli status=ok backend=carto endpoint={}",
        context.endpoint()
    );
    Ok(EvaluationService::new(context, sources))
}

fn load_sources(global: &GlobalOptions) -> Result<PoiSources, String> {
    PoiSources::load(&global.sources).map_err(|err| err.to_string())
}

/// File logging is opt-in: enabled only when a log directory is provided.
fn setup_logging(global: &GlobalOptions) -> Result<(), String> {
    let Some(log_dir) = global
        .log_dir
        .as_deref()
        .filter(|dir| !dir.trim().is_empty())
    else {
        return Ok(());
    };

    let level = global.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, log_dir)
}

#[cfg(test)]
mod tests {
    use super::{
        render_comparison, render_providers, render_snapshots, run, run_compare, run_eval,
        run_nearest,
    };
    use crate::args::{Cli, Command, GlobalOptions};
    use poieval_core::db::open_db;
    use poieval_core::{
        ContextResult, DistanceThresholds, EvaluationService, PoiSources, ProviderRef,
        QueryContext, QueryOptions, SnapshotRepository, SqliteSnapshotRepository, Table, Value,
    };
    use std::path::{Path, PathBuf};

    const SAMPLE_SOURCES: &str = include_str!("../../../poi-sources.json");

    /// Answers the nearest-match query with fixed rows and every lookup with
    /// the same POI, so all pairs within range are hits.
    struct FixedContext;

    impl QueryContext for FixedContext {
        fn query_with_options(&self, sql: &str, _options: &QueryOptions) -> ContextResult<Table> {
            if sql.contains("CROSS JOIN LATERAL") {
                Ok(nearest(&[(1, 11, 10.0), (2, 12, 30.0), (3, 13, 200.0)]))
            } else {
                let mut table = Table::new(["name", "address", "category"]);
                table
                    .push_row(vec![
                        Value::Text("Joe's Pizza".to_string()),
                        Value::Text("7 Carmine St".to_string()),
                        Value::Text("restaurant".to_string()),
                    ])
                    .unwrap();
                Ok(table)
            }
        }

        fn read(&self, _table_name: &str) -> ContextResult<Table> {
            Ok(Table::default())
        }
    }

    fn nearest(rows: &[(i64, i64, f64)]) -> Table {
        let mut table = Table::new(["cartodb_id", "target_cartodb_id", "distance"]);
        for &(id, target, distance) in rows {
            table
                .push_row(vec![
                    Value::Integer(id),
                    Value::Integer(target),
                    Value::Real(distance),
                ])
                .unwrap();
        }
        table
    }

    fn service() -> EvaluationService<FixedContext> {
        EvaluationService::new(FixedContext, PoiSources::from_json_str(SAMPLE_SOURCES).unwrap())
    }

    fn seeded_db(dir: &Path) -> PathBuf {
        let path = dir.join("poieval.db");
        let conn = open_db(&path).unwrap();
        let repo = SqliteSnapshotRepository::new(&conn);
        repo.save_snapshot("older", &nearest(&[(1, 11, 5.0)]))
            .unwrap();
        repo.save_snapshot("nyc", &nearest(&[(1, 11, 10.0), (2, 12, 30.0), (3, 13, 200.0), (4, 14, 90.0)]))
            .unwrap();
        path
    }

    fn global(sources: PathBuf) -> GlobalOptions {
        GlobalOptions {
            sources,
            log_level: None,
            log_dir: None,
        }
    }

    #[test]
    fn eval_prints_summary_of_stored_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path());

        let output = run_eval(&db, "nyc", DistanceThresholds::default()).unwrap();
        assert_eq!(
            output,
            "> 150 meters: 25.00%\n<= 150 meters: 75.00%\n<= 25 meters: 25.00%\nnum misses: 3"
        );

        let tight = DistanceThresholds {
            far_meters: 50.0,
            close_meters: 10.0,
        };
        let output = run_eval(&db, "nyc", tight).unwrap();
        assert!(output.starts_with("> 50 meters: 50.00%"));
    }

    #[test]
    fn eval_of_unknown_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path());

        let err = run_eval(&db, "missing", DistanceThresholds::default()).unwrap_err();
        assert!(err.contains("missing"), "{err}");
    }

    #[test]
    fn snapshots_lists_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path());

        let output = render_snapshots(&db).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("nyc\t4 rows\tcreated_at="));
        assert!(lines[1].starts_with("older\t1 rows\t"));
    }

    #[test]
    fn snapshots_reports_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("empty.db");

        let output = render_snapshots(&db).unwrap();
        assert_eq!(output, format!("no snapshots in {}", db.display()));
    }

    #[test]
    fn providers_lists_sample_configuration() {
        let sources = PoiSources::from_json_str(SAMPLE_SOURCES).unwrap();
        assert_eq!(
            render_providers(&sources).unwrap(),
            "osm: nyc, sf\nsafegraph: nyc, sf"
        );
    }

    #[test]
    fn nearest_prints_summary_and_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("poieval.db");
        let from = ProviderRef::new("safegraph", "nyc");
        let to = ProviderRef::new("osm", "nyc");

        let output = run_nearest(&service(), &from, &to, Some("run-1"), &db).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "nearest osm:nyc for each safegraph:nyc: 3 rows");
        assert_eq!(lines[1], "> 150 meters: 33.33%");
        assert!(lines[5].starts_with("saved snapshot `run-1` ("));

        let stored = run_eval(&db, "run-1", DistanceThresholds::default()).unwrap();
        assert_eq!(stored, lines[1..5].join("\n"));
    }

    #[test]
    fn compare_prints_attribute_report_then_summary() {
        let report_output = run_compare(
            &service(),
            ProviderRef::new("safegraph", "nyc"),
            ProviderRef::new("osm", "nyc"),
            150.0,
        )
        .unwrap();

        let (attributes, summary) = report_output
            .split_once("\n\n")
            .expect("attribute block and summary are separated by a blank line");
        assert!(attributes.contains("1 -> 11"));
        assert!(attributes.contains("3 -> 13"));
        assert!(summary.starts_with("> 150 meters: 33.33%"));
        assert!(summary.ends_with("num misses: 2"));
    }

    #[test]
    fn comparison_without_attributes_prints_summary_only() {
        let mut request = poieval_core::ComparisonRequest::new(
            ProviderRef::new("safegraph", "nyc"),
            ProviderRef::new("osm", "nyc"),
        );
        request.with_attributes = false;
        let report = service().evaluate(&request).unwrap();

        assert_eq!(render_comparison(&report), report.summary.to_string());
    }

    #[test]
    fn run_dispatches_providers_and_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let sources_path = dir.path().join("poi-sources.json");
        std::fs::write(&sources_path, SAMPLE_SOURCES).unwrap();

        let output = run(Cli {
            global: global(sources_path),
            command: Command::Providers,
        })
        .unwrap();
        assert!(output.starts_with("osm: "));

        let err = run(Cli {
            global: global(dir.path().join("absent.json")),
            command: Command::Providers,
        })
        .unwrap_err();
        assert!(err.contains("absent.json"), "{err}");
    }

    #[test]
    fn run_dispatches_eval_with_requested_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path());

        let output = run(Cli {
            global: global(dir.path().join("unused.json")),
            command: Command::Eval {
                snapshot: "nyc".to_string(),
                db,
                far: 100.0,
                close: 10.0,
            },
        })
        .unwrap();
        assert!(output.starts_with("> 100 meters: 25.00%"));
        assert!(output.contains("<= 10 meters: 25.00%"));
    }
}
