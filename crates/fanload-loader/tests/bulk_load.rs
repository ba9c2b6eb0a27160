//! End-to-end loads against the in-memory connector.

use std::sync::Arc;
use std::time::Duration;

use fanload_connectors::{ConnectionDescriptor, LoggedStatement, MemoryConnector};
use fanload_core::{NullMode, Series, Table, Value};
use fanload_loader::{
    BulkLoader, IndexOutcome, LoadError, LoadOptions, LoaderMetrics, StatementMode,
};

fn descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::new("memory", "loader", "secret", "warehouse")
}

fn loader(connector: &MemoryConnector) -> BulkLoader {
    BulkLoader::new(Arc::new(connector.clone()), descriptor())
}

/// `rows` x 4 frame: id, A, B, C.
fn frame(rows: i64) -> Table {
    Table::new(
        vec!["id".into(), "A".into(), "B".into(), "C".into()],
        (0..rows)
            .map(|i| {
                vec![
                    Value::Int(i),
                    Value::Int((i * 37) % 100),
                    Value::Float(i as f64 * 0.25),
                    Value::Text(format!("row-{}", i)),
                ]
            })
            .collect(),
    )
    .unwrap()
}

fn inserts(log: &[LoggedStatement]) -> Vec<&LoggedStatement> {
    log.iter().filter(|s| s.sql.starts_with("INSERT")).collect()
}

#[tokio::test]
async fn test_ten_rows_ten_partitions_one_worker() {
    let connector = MemoryConnector::new();
    let options = LoadOptions::default().with_partitions(10).with_workers(1);

    let result = loader(&connector)
        .load(frame(10).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.partitions, 10);
    assert_eq!(result.succeeded, 10);
    assert_eq!(result.rows_written, 10);
    assert!(result.is_complete());
    assert!(!result.series_bypass);

    let log = connector.statements();
    assert!(log[0].sql.starts_with("CREATE TABLE IF NOT EXISTS `t`"));
    let inserts = inserts(&log);
    assert_eq!(inserts.len(), 10);
    assert!(inserts.iter().all(|s| s.row_count == 1));

    let stored = connector.table("t").unwrap();
    assert_eq!(stored.columns.len(), 4);
    assert_eq!(stored.rows.len(), 10);
    assert_eq!(connector.opened(), 11);
    assert_eq!(connector.closed(), 11);
    assert_eq!(connector.peak_open(), 1);
}

#[tokio::test]
async fn test_one_failed_partition_keeps_the_others() {
    let connector = MemoryConnector::new().fail_insert_covering(3);
    let options = LoadOptions::default().with_partitions(10).with_workers(4);

    let result = loader(&connector)
        .load(frame(10).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 9);
    assert_eq!(result.rows_written, 9);
    assert_eq!(result.failed_partitions(), vec![3]);
    assert_eq!(result.failures[0].rows, 3..4);
    assert!(matches!(result.failures[0].cause, LoadError::Execution(_)));

    let stored = connector.table("t").unwrap();
    assert_eq!(stored.rows.len(), 9);
    assert!(!stored.rows.iter().any(|row| row[0] == Value::Int(3)));
    assert_eq!(connector.opened(), connector.closed());
}

#[tokio::test]
async fn test_connection_failure_is_reported_for_its_partition() {
    // Open #1 bootstraps; #2..#11 belong to the ten partitions in some order.
    let connector = MemoryConnector::new().fail_open(5);
    let options = LoadOptions::default().with_partitions(10).with_workers(1);

    let result = loader(&connector)
        .load(frame(10).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 9);
    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert!(matches!(failure.cause, LoadError::Connection(_)));

    let stored = connector.table("t").unwrap();
    assert_eq!(stored.rows.len(), 9);
    let missing: Vec<i64> = (0..10)
        .filter(|i| !stored.rows.iter().any(|row| row[0] == Value::Int(*i)))
        .collect();
    assert_eq!(missing, vec![failure.rows.start as i64]);
    assert_eq!(failure.partition_index, failure.rows.start);
}

#[tokio::test]
async fn test_index_created_once_after_all_partitions() {
    let connector = MemoryConnector::new();
    let options = LoadOptions::default()
        .with_partitions(4)
        .with_workers(2)
        .with_index_columns(["id", "A"]);

    let result = loader(&connector)
        .load(frame(10).into(), "t", &options)
        .await
        .unwrap();

    assert!(matches!(result.index, IndexOutcome::Created));
    let log = connector.statements();
    let alters: Vec<_> = log.iter().filter(|s| s.sql.starts_with("ALTER")).collect();
    assert_eq!(alters.len(), 1);
    assert_eq!(
        log.last().unwrap().sql,
        "ALTER TABLE `t` ADD INDEX (`id`, `A`)"
    );
    assert_eq!(
        connector.table("t").unwrap().indexes,
        vec![vec!["id".to_string(), "A".to_string()]]
    );
}

#[tokio::test]
async fn test_index_skipped_after_failure() {
    let connector = MemoryConnector::new().fail_insert_covering(0);
    let options = LoadOptions::default()
        .with_partitions(2)
        .with_index_columns(["id"]);

    let result = loader(&connector)
        .load(frame(4).into(), "t", &options)
        .await
        .unwrap();

    assert!(matches!(result.index, IndexOutcome::SkippedAfterFailures));
    assert!(!connector
        .statements()
        .iter()
        .any(|s| s.sql.starts_with("ALTER")));
    assert!(connector.table("t").unwrap().indexes.is_empty());
}

#[tokio::test]
async fn test_index_failure_keeps_data() {
    let connector = MemoryConnector::new().fail_add_index();
    let options = LoadOptions::default()
        .with_partitions(3)
        .with_index_columns(["id"]);

    let result = loader(&connector)
        .load(frame(6).into(), "t", &options)
        .await
        .unwrap();

    assert!(matches!(
        result.index,
        IndexOutcome::Failed(LoadError::IndexCreationFailed(_))
    ));
    assert!(!result.has_failures());
    assert!(!result.is_complete());
    assert_eq!(connector.table("t").unwrap().rows.len(), 6);
}

#[tokio::test]
async fn test_series_bypasses_partitioning() {
    let connector = MemoryConnector::new();
    let series = Series::new(
        "reading",
        (0..25).map(|i| Value::Float(i as f64)).collect(),
    );
    let options = LoadOptions::default().with_partitions(8).with_workers(4);

    let result = loader(&connector)
        .load(series.into(), "readings", &options)
        .await
        .unwrap();

    assert!(result.series_bypass);
    assert_eq!(result.partitions, 1);
    assert_eq!(result.rows_written, 25);
    let log = connector.statements();
    let inserts = inserts(&log);
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].row_count, 25);

    let stored = connector.table("readings").unwrap();
    assert_eq!(stored.columns.len(), 1);
    assert_eq!(stored.columns[0].name, "reading");
    assert_eq!(connector.opened(), 2);
}

#[tokio::test]
async fn test_bootstrap_failure_aborts_load() {
    let connector = MemoryConnector::new().fail_create_table();
    let options = LoadOptions::default().with_partitions(4).with_workers(4);

    let err = loader(&connector)
        .load(frame(8).into(), "t", &options)
        .await
        .unwrap_err();

    assert!(matches!(err, LoadError::BootstrapFailed(_)));
    assert_eq!(connector.opened(), 1);
    assert!(inserts(&connector.statements()).is_empty());
}

#[tokio::test]
async fn test_empty_frame_bootstraps_only() {
    let connector = MemoryConnector::new();
    let options = LoadOptions::default().with_partitions(4);

    let result = loader(&connector)
        .load(frame(0).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.partitions, 0);
    assert_eq!(result.rows_written, 0);
    assert!(result.is_complete());
    assert!(connector.table("t").is_some());
    assert_eq!(connector.statements().len(), 1);
}

#[tokio::test]
async fn test_partition_count_capped_at_rows() {
    let connector = MemoryConnector::new();
    let options = LoadOptions::default().with_partitions(10).with_workers(10);

    let result = loader(&connector)
        .load(frame(3).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.partitions, 3);
    assert_eq!(inserts(&connector.statements()).len(), 3);
}

#[tokio::test]
async fn test_concurrency_bounded_by_workers() {
    let connector = MemoryConnector::new().with_open_delay(Duration::from_millis(5));
    let options = LoadOptions::default().with_partitions(20).with_workers(3);

    let result = loader(&connector)
        .load(frame(20).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 20);
    assert!(connector.peak_open() <= 3);
    assert!(connector.peak_open() >= 1);
}

#[tokio::test]
async fn test_legacy_parallelism_knob() {
    let connector = MemoryConnector::new().with_open_delay(Duration::from_millis(5));
    let options = LoadOptions::default()
        .with_partitions(16)
        .with_legacy_parallelism(2, 2);

    let result = loader(&connector)
        .load(frame(16).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 16);
    assert!(connector.peak_open() <= 4);
}

#[tokio::test]
async fn test_deadline_fails_unfinished_partitions() {
    let connector = MemoryConnector::new().with_open_delay(Duration::from_millis(150));
    let options = LoadOptions::default()
        .with_partitions(3)
        .with_workers(1)
        .with_index_columns(["id"])
        .with_deadline(Duration::from_millis(20));

    let result = loader(&connector)
        .load(frame(3).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed_partitions(), vec![0, 1, 2]);
    assert!(result
        .failures
        .iter()
        .all(|f| matches!(f.cause, LoadError::DeadlineExceeded(_))));
    assert!(matches!(result.index, IndexOutcome::SkippedAfterFailures));
    assert!(connector.table("t").unwrap().rows.is_empty());
}

#[tokio::test]
async fn test_deadline_mid_insert_releases_connections() {
    let connector = MemoryConnector::new().with_execute_delay(Duration::from_millis(250));
    let metrics = LoaderMetrics::new();
    let options = LoadOptions::default()
        .with_partitions(4)
        .with_workers(2)
        .with_deadline(Duration::from_millis(100));

    let result = loader(&connector)
        .with_metrics(metrics.clone())
        .load(frame(8).into(), "t", &options)
        .await
        .unwrap();

    assert_eq!(result.failed_partitions(), vec![0, 1, 2, 3]);
    assert!(result
        .failures
        .iter()
        .all(|f| matches!(f.cause, LoadError::DeadlineExceeded(_))));
    // Bootstrap plus the two writers caught mid-insert.
    assert_eq!(connector.opened(), 3);
    assert_eq!(connector.closed(), 3);
    assert_eq!(metrics.active_writers.get(), 0);
    assert!(connector.table("t").unwrap().rows.is_empty());
}

#[tokio::test]
async fn test_series_deadline_releases_connection() {
    let connector = MemoryConnector::new().with_execute_delay(Duration::from_millis(200));
    let metrics = LoaderMetrics::new();
    let series = Series::new("v", (0..5).map(Value::Int).collect());
    let options = LoadOptions::default().with_deadline(Duration::from_millis(50));

    let result = loader(&connector)
        .with_metrics(metrics.clone())
        .load(series.into(), "s", &options)
        .await
        .unwrap();

    assert!(matches!(
        result.failures[0].cause,
        LoadError::DeadlineExceeded(_)
    ));
    assert_eq!(connector.opened(), 2);
    assert_eq!(connector.closed(), 2);
    assert_eq!(metrics.active_writers.get(), 0);
}

#[tokio::test]
async fn test_nulls_written_as_text_by_default() {
    let table = Table::new(
        vec!["id".into(), "note".into()],
        vec![
            vec![Value::Int(1), Value::Null],
            vec![Value::Int(2), Value::from("x")],
        ],
    )
    .unwrap();

    let legacy = MemoryConnector::new();
    loader(&legacy)
        .load(table.clone().into(), "t", &LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(legacy.table("t").unwrap().rows[0][1], Value::from("NULL"));

    let sql_null = MemoryConnector::new();
    loader(&sql_null)
        .load(
            table.into(),
            "t",
            &LoadOptions::default().with_nulls(NullMode::SqlNull),
        )
        .await
        .unwrap();
    assert_eq!(sql_null.table("t").unwrap().rows[0][1], Value::Null);
}

#[tokio::test]
async fn test_statement_modes() {
    let bound = MemoryConnector::new();
    loader(&bound)
        .load(frame(3).into(), "t", &LoadOptions::default())
        .await
        .unwrap();
    let log = bound.statements();
    let insert = inserts(&log)[0];
    assert_eq!(insert.param_count, 12);
    assert!(insert.sql.ends_with("(?, ?, ?, ?), (?, ?, ?, ?), (?, ?, ?, ?)"));

    let literal = MemoryConnector::new();
    loader(&literal)
        .load(
            frame(3).into(),
            "t",
            &LoadOptions::default().with_statement_mode(StatementMode::Literal),
        )
        .await
        .unwrap();
    let log = literal.statements();
    let insert = inserts(&log)[0];
    assert_eq!(insert.param_count, 0);
    assert!(insert.sql.contains("(1, 37, 0.25, 'row-1')"));
}

#[tokio::test]
async fn test_invalid_arguments_open_nothing() {
    let connector = MemoryConnector::new();
    let loader = loader(&connector);

    let cases = [
        (LoadOptions::default().with_partitions(0), "t"),
        (LoadOptions::default().with_workers(0), "t"),
        (LoadOptions::default().with_index_columns(["missing"]), "t"),
        (LoadOptions::default(), "  "),
    ];
    for (options, table) in cases {
        let err = loader
            .load(frame(2).into(), table, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidArgument(_)), "{:?}", err);
    }
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_metrics_recorded() {
    let connector = MemoryConnector::new().fail_insert_covering(0);
    let metrics = LoaderMetrics::new();
    let loader = loader(&connector).with_metrics(metrics.clone());

    loader
        .load(
            frame(4).into(),
            "t",
            &LoadOptions::default().with_partitions(2),
        )
        .await
        .unwrap();

    assert_eq!(metrics.partitions_written.get(), 1);
    assert_eq!(metrics.partitions_failed.get(), 1);
    assert_eq!(metrics.rows_written.get(), 2);
    assert_eq!(metrics.active_writers.get(), 0);
    let text = metrics.encode().unwrap();
    assert!(text.contains("fanload_loads_completed_total{outcome=\"partial\"} 1"));
}

#[tokio::test]
async fn test_result_serializes_to_json() {
    let connector = MemoryConnector::new();
    let result = loader(&connector)
        .load(
            frame(2).into(),
            "t",
            &LoadOptions::default().with_index_columns(["id"]),
        )
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["table"], "t");
    assert_eq!(json["rows_written"], 2);
    assert_eq!(json["index"]["status"], "created");
    assert!(json["failures"].as_array().unwrap().is_empty());
}
