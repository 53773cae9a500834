use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, NOT_AVAILABLE, Payload, PayloadShape,
    QuerySource, Row, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::instrument;

const TEMP_KEY: &str = "temp_usage";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const TEMP_USAGE_SQL: &str = r"
SELECT
    t.SESSION_ID AS sid,
    p.USER AS username,
    p.HOST AS host,
    t.TABLE_SCHEMA AS schema_name,
    t.TABLE_NAME AS table_name,
    t.ENGINE AS engine,
    t.TABLE_ROWS AS table_rows,
    CAST(COALESCE(t.DATA_LENGTH, 0) + COALESCE(t.INDEX_LENGTH, 0) AS UNSIGNED) AS used_bytes
FROM information_schema.GLOBAL_TEMPORARY_TABLES t
LEFT JOIN information_schema.PROCESSLIST p ON p.ID = t.SESSION_ID
ORDER BY used_bytes DESC, t.SESSION_ID
LIMIT ?";

static TABLE: Table = Table {
    name: "temp_usage_history",
    columns: &[
        Column::integer("sid"),
        Column::text("username"),
        Column::text("host"),
        Column::text("schema_name"),
        Column::text("table_name"),
        Column::text("engine"),
        Column::integer("table_rows"),
        Column::real("used_mb"),
    ],
    indexed: &["sid"],
};

/// Temporary tables held open by client sessions, largest first.
///
/// Needs the `PROCESS` privilege and a server that exposes
/// `GLOBAL_TEMPORARY_TABLES`, so it is opt-in.
#[derive(Clone, Debug, Default)]
pub struct TempUsage;

impl TempUsage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(row: &Row) -> Record {
        let used_mb = row.f64("used_bytes").unwrap_or(0.0) / BYTES_PER_MB;
        record([
            ("sid", json!(row.i64("sid").unwrap_or(0))),
            ("username", json!(row.text_or("username", NOT_AVAILABLE))),
            ("host", json!(row.text_or("host", NOT_AVAILABLE))),
            ("schema_name", json!(row.text_or("schema_name", NOT_AVAILABLE))),
            ("table_name", json!(row.text_or("table_name", NOT_AVAILABLE))),
            ("engine", json!(row.text_or("engine", NOT_AVAILABLE))),
            ("table_rows", json!(row.i64("table_rows").unwrap_or(0))),
            ("used_mb", json!(round2(used_mb))),
        ])
    }
}

impl Metric for TempUsage {
    fn name(&self) -> &'static str {
        "temp_usage"
    }

    fn display_name(&self) -> &'static str {
        "Temp Usage"
    }

    fn description(&self) -> &'static str {
        "Temporary table space used by session"
    }

    fn category(&self) -> Category {
        Category::Storage
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(TEMP_KEY)
    }

    #[instrument(skip(self, source, params), level = "info", fields(metric = "temp_usage", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source
                .fetch_all(TEMP_USAGE_SQL, &[params.limit.into()])
                .await?;

            Ok(Some(Payload::list(
                TEMP_KEY,
                rows.iter().map(Self::to_record).collect(),
            )))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let tables = payload.records();
        let total_mb: f64 = tables
            .iter()
            .filter_map(|t| t.get("used_mb").and_then(Value::as_f64))
            .sum();
        let largest = tables
            .first()
            .and_then(|t| t.get("username"))
            .and_then(Value::as_str)
            .unwrap_or(NOT_AVAILABLE);

        Some(vec![
            ("Temp Tables", payload.count().to_string()),
            ("Total (MB)", format!("{total_mb:.2}")),
            ("Largest User", largest.to_string()),
        ])
    }

    fn enabled_by_default(&self) -> bool {
        false
    }
}
