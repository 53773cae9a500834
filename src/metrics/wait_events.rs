use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, NOT_AVAILABLE, Payload, PayloadShape,
    QuerySource, Row, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::instrument;

const EVENTS_KEY: &str = "wait_events";

// performance_schema timers are in picoseconds
const PICOS_PER_SECOND: f64 = 1e12;
const PICOS_PER_MILLI: f64 = 1e9;

const WAIT_EVENTS_SQL: &str = r"
SELECT
    EVENT_NAME AS event,
    COUNT_STAR AS total_waits,
    SUM_TIMER_WAIT AS sum_timer_wait,
    AVG_TIMER_WAIT AS avg_timer_wait
FROM performance_schema.events_waits_summary_global_by_event_name
WHERE COUNT_STAR > 0
  AND EVENT_NAME <> 'idle'
ORDER BY SUM_TIMER_WAIT DESC
LIMIT ?";

static TABLE: Table = Table {
    name: "wait_events_history",
    columns: &[
        Column::text("event"),
        Column::integer("total_waits"),
        Column::real("total_wait_seconds"),
        Column::real("avg_wait_ms"),
    ],
    indexed: &["event"],
};

/// Where the server spends its waiting time (requires `performance_schema`).
#[derive(Clone, Debug, Default)]
pub struct WaitEvents;

impl WaitEvents {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(row: &Row) -> Record {
        let sum = row.f64("sum_timer_wait").unwrap_or(0.0);
        let avg = row.f64("avg_timer_wait").unwrap_or(0.0);
        record([
            ("event", json!(row.text_or("event", NOT_AVAILABLE))),
            ("total_waits", json!(row.i64("total_waits").unwrap_or(0))),
            ("total_wait_seconds", json!(round2(sum / PICOS_PER_SECOND))),
            ("avg_wait_ms", json!(round2(avg / PICOS_PER_MILLI))),
        ])
    }
}

impl Metric for WaitEvents {
    fn name(&self) -> &'static str {
        "wait_events"
    }

    fn display_name(&self) -> &'static str {
        "Wait Events"
    }

    fn description(&self) -> &'static str {
        "Top wait events by total time waited since server start"
    }

    fn category(&self) -> Category {
        Category::Performance
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(EVENTS_KEY)
    }

    #[instrument(skip(self, source, params), level = "info", fields(metric = "wait_events", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source
                .fetch_all(WAIT_EVENTS_SQL, &[params.limit.into()])
                .await?;

            Ok(Some(Payload::list(
                EVENTS_KEY,
                rows.iter().map(Self::to_record).collect(),
            )))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let top = payload.records().first()?;
        Some(vec![
            ("Events", payload.count().to_string()),
            (
                "Top Event",
                top.get("event")
                    .and_then(Value::as_str)
                    .unwrap_or(NOT_AVAILABLE)
                    .to_string(),
            ),
            (
                "Top Wait (sec)",
                format!(
                    "{:.2}",
                    top.get("total_wait_seconds")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0)
                ),
            ),
        ])
    }

    fn enabled_by_default(&self) -> bool {
        false
    }
}
