use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, NOT_AVAILABLE, Payload, PayloadShape,
    QuerySource, Row, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::instrument;

const PLANS_KEY: &str = "plans";

const PICOS_PER_SECOND: f64 = 1e12;

const DIGEST_SQL: &str = r"
SELECT
    DIGEST AS digest,
    SCHEMA_NAME AS schema_name,
    LEFT(DIGEST_TEXT, 200) AS digest_text,
    COUNT_STAR AS executions,
    SUM_TIMER_WAIT AS sum_timer_wait,
    SUM_ROWS_EXAMINED AS rows_examined,
    SUM_ROWS_SENT AS rows_sent,
    SUM_NO_INDEX_USED AS no_index_used,
    CAST(LAST_SEEN AS CHAR) AS last_seen
FROM performance_schema.events_statements_summary_by_digest
WHERE COUNT_STAR > 0
ORDER BY COUNT_STAR DESC
LIMIT ?";

static TABLE: Table = Table {
    name: "plan_churn_history",
    columns: &[
        Column::text("digest"),
        Column::text("schema_name"),
        Column::text("digest_text"),
        Column::integer("executions"),
        Column::real("elapsed_seconds"),
        Column::real("avg_ms"),
        Column::integer("rows_examined"),
        Column::integer("rows_sent"),
        Column::integer("no_index_used"),
        Column::text("last_seen"),
    ],
    indexed: &["digest"],
};

/// Most executed statement digests with their cost (requires
/// `performance_schema` statement digests).
#[derive(Clone, Debug, Default)]
pub struct PlanChurn;

impl PlanChurn {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(row: &Row) -> Record {
        let executions = row.i64("executions").unwrap_or(0);
        let elapsed = row.f64("sum_timer_wait").unwrap_or(0.0) / PICOS_PER_SECOND;
        #[allow(clippy::cast_precision_loss)]
        let avg_ms = if executions > 0 {
            elapsed * 1000.0 / executions as f64
        } else {
            0.0
        };

        record([
            ("digest", json!(row.text_or("digest", NOT_AVAILABLE))),
            ("schema_name", json!(row.text_or("schema_name", NOT_AVAILABLE))),
            ("digest_text", json!(row.text_or("digest_text", NOT_AVAILABLE))),
            ("executions", json!(executions)),
            ("elapsed_seconds", json!(round2(elapsed))),
            ("avg_ms", json!(round2(avg_ms))),
            ("rows_examined", json!(row.i64("rows_examined").unwrap_or(0))),
            ("rows_sent", json!(row.i64("rows_sent").unwrap_or(0))),
            ("no_index_used", json!(row.i64("no_index_used").unwrap_or(0))),
            ("last_seen", json!(row.text_or("last_seen", NOT_AVAILABLE))),
        ])
    }
}

impl Metric for PlanChurn {
    fn name(&self) -> &'static str {
        "plan_churn"
    }

    fn display_name(&self) -> &'static str {
        "Plan Churn"
    }

    fn description(&self) -> &'static str {
        "Most executed statement digests with elapsed time and rows examined"
    }

    fn category(&self) -> Category {
        Category::Performance
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(PLANS_KEY)
    }

    #[instrument(skip(self, source, params), level = "info", fields(metric = "plan_churn", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source.fetch_all(DIGEST_SQL, &[params.limit.into()]).await?;

            Ok(Some(Payload::list(
                PLANS_KEY,
                rows.iter().map(Self::to_record).collect(),
            )))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let plans = payload.records();
        let sum = |field: &str| -> i64 {
            plans
                .iter()
                .filter_map(|p| p.get(field).and_then(Value::as_i64))
                .sum()
        };

        Some(vec![
            ("Digests", plans.len().to_string()),
            ("Executions", sum("executions").to_string()),
            ("Without Index", sum("no_index_used").to_string()),
        ])
    }

    fn enabled_by_default(&self) -> bool {
        false
    }
}
