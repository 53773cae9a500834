#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::indexing_slicing)]

mod common;

use common::{FakeSource, read_log, row};
use mariadb_monitor::alerts::{AlertLevel, Thresholds};
use mariadb_monitor::metrics::{CollectParams, MetricConfig, MetricRegistry};
use mariadb_monitor::monitor::Sampler;
use mariadb_monitor::store::HistoryStore;
use serde_json::{Value, json};
use std::path::Path;

fn status(name: &str, value: &str) -> mariadb_monitor::metrics::Row {
    row(&[("name", json!(name)), ("value", json!(value))])
}

fn source() -> FakeSource {
    FakeSource::new()
        .with_rows("@@innodb_page_size", vec![row(&[("page_size", json!(16384))])])
        .with_rows(
            "PROCESSLIST",
            vec![row(&[
                ("total_sessions", json!(25)),
                ("active_sessions", json!(4)),
                ("inactive_sessions", json!(21)),
                ("active_seconds", json!(9)),
            ])],
        )
        .with_rows(
            "INNODB_LOCK_WAITS",
            vec![row(&[("blocked_sessions", json!(0))])],
        )
        .with_rows(
            "GLOBAL_STATUS",
            vec![
                status("INNODB_BUFFER_POOL_READ_REQUESTS", "6400"),
                status("INNODB_PAGES_READ", "64"),
                status("THREADS_CONNECTED", "25"),
                status("MAX_USED_CONNECTIONS", "40"),
                status("OPEN_FILES", "12"),
                status("OPEN_TABLES", "300"),
            ],
        )
        .with_rows(
            "GLOBAL_VARIABLES",
            vec![
                status("MAX_CONNECTIONS", "100"),
                status("OPEN_FILES_LIMIT", "1024"),
                status("TABLE_OPEN_CACHE", "400"),
            ],
        )
}

async fn sampler(dir: &Path) -> anyhow::Result<Sampler> {
    let config = MetricConfig::new().with_enabled(&[
        "session_overview".to_string(),
        "resource_limits".to_string(),
        "host_metrics".to_string(),
    ]);
    let registry = MetricRegistry::discover(dir, &config)?;
    let store = HistoryStore::in_memory().await?;

    let thresholds = Thresholds {
        max_sessions: 20,
        ..Thresholds::default()
    };
    let sampler = Sampler::new(registry, store, CollectParams::default(), thresholds);
    sampler.prepare().await?;
    Ok(sampler)
}

#[tokio::test]
async fn full_pass_collects_logs_persists_and_alerts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sampler = sampler(dir.path()).await?;
    let source = source();

    let report = sampler.run_once(&source, Some("pass-1")).await;

    assert_eq!(
        report.sample.names(),
        vec!["session_overview", "resource_limits", "host_metrics"]
    );
    assert_eq!(report.logged.written, 3);
    assert_eq!(report.persisted.failed, 0);
    // one overview row, three limits, one host row
    assert_eq!(report.persisted.records, 5);

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].level, AlertLevel::Warning);
    assert_eq!(report.alerts[0].metric, "session_overview");

    let overview = report.sample.get("session_overview").expect("collected");
    assert_eq!(overview.field_i64("total_sessions"), Some(25));

    let limits = report.sample.get("resource_limits").expect("collected");
    let connections = &limits.records()[0];
    assert_eq!(connections["pct_used"], json!(25.0));

    let store = sampler.store();
    assert_eq!(store.row_count("session_overview_history").await?, 1);
    assert_eq!(store.row_count("resource_limits_history").await?, 3);
    assert_eq!(store.row_count("host_metrics_history").await?, 1);
    assert_eq!(store.row_count("top_sessions_history").await?, 0);

    let lines = read_log(&dir.path().join("resource_limits.jsonl"))?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["sample_id"], json!("pass-1"));
    assert_eq!(lines[0]["data"]["count"], json!(3));

    sampler.log_report(&report);
    Ok(())
}

#[tokio::test]
async fn consecutive_passes_append_history() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sampler = sampler(dir.path()).await?;
    let source = source();

    let first = sampler.run_once(&source, None).await;
    let second = sampler.run_once(&source, Some("pass-2")).await;
    assert_ne!(first.sample_id, second.sample_id);

    let handle = sampler
        .registry()
        .lookup("session_overview")
        .expect("registered");
    let history = handle.metric().fetch_history(sampler.store(), 10).await?;

    let ids: Vec<&Value> = history.iter().map(|r| &r["sample_id"]).collect();
    assert_eq!(ids, vec![&json!("pass-2"), &json!(first.sample_id)]);

    assert_eq!(read_log(handle.log_path())?.len(), 2);
    assert!(sampler.registry().stats().samples() >= 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_keeps_host_metrics_only() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sampler = sampler(dir.path()).await?;

    let report = sampler.run_once(&FakeSource::new(), Some("offline")).await;

    assert_eq!(report.sample.names(), vec!["host_metrics"]);
    assert!(report.alerts.is_empty());
    assert_eq!(report.persisted.records, 1);

    let stats = sampler.registry().stats();
    assert!(stats.collect_errors("session_overview") >= 1.0);
    assert!(stats.collect_errors("resource_limits") >= 1.0);
    assert!(stats.encode_text()?.contains("mariadb_monitor_collect_errors_total"));
    Ok(())
}
