use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, Payload, PayloadShape, QuerySource, Row,
    Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::{debug, instrument};

const TABLESPACES_KEY: &str = "tablespaces";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const SCHEMA_SIZES_SQL: &str = r"
SELECT
    t.TABLE_SCHEMA AS schema_name,
    COUNT(*) AS tables,
    CAST(COALESCE(SUM(t.DATA_LENGTH), 0) AS SIGNED) AS data_bytes,
    CAST(COALESCE(SUM(t.INDEX_LENGTH), 0) AS SIGNED) AS index_bytes,
    CAST(COALESCE(SUM(t.DATA_FREE), 0) AS SIGNED) AS free_bytes
FROM information_schema.TABLES t
WHERE t.TABLE_TYPE = 'BASE TABLE'
GROUP BY t.TABLE_SCHEMA";

static TABLE: Table = Table {
    name: "tablespace_usage_history",
    columns: &[
        Column::text("tablespace"),
        Column::integer("tables"),
        Column::real("used_mb"),
        Column::real("allocated_mb"),
        Column::real("free_mb"),
        Column::real("pct_used"),
    ],
    indexed: &["tablespace"],
};

/// Space used by each schema: data plus indexes against what is allocated.
#[derive(Clone, Debug, Default)]
pub struct TablespaceUsage;

impl TablespaceUsage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(schema: &str, row: &Row) -> Record {
        let bytes = |column| row.f64(column).unwrap_or(0.0).max(0.0);
        let used = bytes("data_bytes") + bytes("index_bytes");
        let free = bytes("free_bytes");
        let allocated = used + free;
        let pct_used = if allocated > 0.0 {
            used / allocated * 100.0
        } else {
            0.0
        };

        record([
            ("tablespace", json!(schema)),
            ("tables", json!(row.i64("tables").unwrap_or(0))),
            ("used_mb", json!(round2(used / BYTES_PER_MB))),
            ("allocated_mb", json!(round2(allocated / BYTES_PER_MB))),
            ("free_mb", json!(round2(free / BYTES_PER_MB))),
            ("pct_used", json!(round2(pct_used))),
        ])
    }
}

fn pct_used(record: &Record) -> f64 {
    record.get("pct_used").and_then(Value::as_f64).unwrap_or(0.0)
}

impl Metric for TablespaceUsage {
    fn name(&self) -> &'static str {
        "tablespace_usage"
    }

    fn display_name(&self) -> &'static str {
        "Tablespace Usage"
    }

    fn description(&self) -> &'static str {
        "Per-schema data, index and free space, fullest first"
    }

    fn category(&self) -> Category {
        Category::Storage
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(TABLESPACES_KEY)
    }

    #[instrument(skip(self, source, params), level = "info", fields(metric = "tablespace_usage", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source.fetch_all(SCHEMA_SIZES_SQL, &[]).await?;

            let mut tablespaces: Vec<Record> = rows
                .iter()
                .filter_map(|row| {
                    let schema = row.text("schema_name")?;
                    if params.is_schema_excluded(schema) {
                        debug!(schema, "Skipping excluded schema");
                        return None;
                    }
                    Some(Self::to_record(schema, row))
                })
                .collect();

            tablespaces.sort_by(|a, b| pct_used(b).total_cmp(&pct_used(a)));

            Ok(Some(Payload::list(TABLESPACES_KEY, tablespaces)))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let tablespaces = payload.records();
        let fullest = tablespaces.first()?;
        let total_used: f64 = tablespaces
            .iter()
            .filter_map(|t| t.get("used_mb").and_then(Value::as_f64))
            .sum();

        Some(vec![
            ("Schemas", tablespaces.len().to_string()),
            (
                "Fullest",
                format!(
                    "{} ({:.1}%)",
                    fullest
                        .get("tablespace")
                        .and_then(Value::as_str)
                        .unwrap_or_default(),
                    pct_used(fullest)
                ),
            ),
            ("Used (MB)", format!("{total_used:.1}")),
        ])
    }
}
