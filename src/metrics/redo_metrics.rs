use crate::metrics::payload::record;
use crate::metrics::source::name_values;
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, Payload, PayloadShape, QuerySource, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::instrument;

const REDO_STATUS_SQL: &str = r"
SELECT VARIABLE_NAME AS name, VARIABLE_VALUE AS value
FROM information_schema.GLOBAL_STATUS
WHERE VARIABLE_NAME IN ('INNODB_OS_LOG_WRITTEN', 'INNODB_LOG_WRITES', 'INNODB_LOG_WAITS')";

static TABLE: Table = Table {
    name: "redo_metrics_history",
    columns: &[
        Column::real("redo_size"),
        Column::integer("redo_writes"),
        Column::integer("redo_waits"),
    ],
    indexed: &[],
};

/// Cumulative redo log volume and write pressure since server start.
#[derive(Clone, Debug, Default)]
pub struct RedoMetrics;

impl RedoMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Metric for RedoMetrics {
    fn name(&self) -> &'static str {
        "redo_metrics"
    }

    fn display_name(&self) -> &'static str {
        "Redo Metrics"
    }

    fn description(&self) -> &'static str {
        "Redo log generation and performance metrics"
    }

    fn category(&self) -> Category {
        Category::Performance
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::ScalarRecord
    }

    #[instrument(skip(self, source, _params), level = "info", fields(metric = "redo_metrics", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let status = name_values(&source.fetch_all(REDO_STATUS_SQL, &[]).await?);
            if status.is_empty() {
                return Err(CollectionError::MissingStatistic("innodb_log_writes"));
            }

            let counter = |name: &str| status.get(name).copied().unwrap_or(0.0);

            #[allow(clippy::cast_possible_truncation)]
            let (writes, waits) = (
                counter("innodb_log_writes") as i64,
                counter("innodb_log_waits") as i64,
            );

            Ok(Some(Payload::scalar(record([
                ("redo_size", json!(counter("innodb_os_log_written"))),
                ("redo_writes", json!(writes)),
                ("redo_waits", json!(waits)),
            ]))))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let redo_mb = payload.field_f64("redo_size").unwrap_or(0.0) / (1024.0 * 1024.0);
        Some(vec![
            ("Redo Written (MB)", format!("{redo_mb:.1}")),
            (
                "Log Writes",
                payload.field_i64("redo_writes").unwrap_or(0).to_string(),
            ),
            (
                "Log Waits",
                payload.field_i64("redo_waits").unwrap_or(0).to_string(),
            ),
        ])
    }
}
