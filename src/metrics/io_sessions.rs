use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, NOT_AVAILABLE, Payload, PayloadShape,
    QuerySource, Row, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::instrument;

const SESSIONS_KEY: &str = "io_sessions";

// performance_schema timers are in picoseconds
const PICOS_PER_SECOND: f64 = 1e12;

// Waits come from the per-thread wait summary, row counts from the
// per-thread statement summary; both are cumulative for the thread.
const IO_SESSIONS_SQL: &str = r"
SELECT
    t.PROCESSLIST_ID AS sid,
    t.PROCESSLIST_USER AS username,
    t.PROCESSLIST_HOST AS host,
    t.PROCESSLIST_COMMAND AS command,
    t.PROCESSLIST_STATE AS state,
    CAST(SUM(w.COUNT_STAR) AS UNSIGNED) AS io_waits,
    CAST(SUM(w.SUM_TIMER_WAIT) AS UNSIGNED) AS io_wait_timer,
    CAST(MAX(s.rows_read) AS UNSIGNED) AS rows_read,
    CAST(MAX(s.rows_written) AS UNSIGNED) AS rows_written
FROM performance_schema.events_waits_summary_by_thread_by_event_name w
JOIN performance_schema.threads t ON t.THREAD_ID = w.THREAD_ID
LEFT JOIN (
    SELECT
        THREAD_ID,
        SUM(SUM_ROWS_EXAMINED) AS rows_read,
        SUM(SUM_ROWS_AFFECTED) AS rows_written
    FROM performance_schema.events_statements_summary_by_thread_by_event_name
    GROUP BY THREAD_ID
) s ON s.THREAD_ID = t.THREAD_ID
WHERE w.EVENT_NAME LIKE 'wait/io/%'
  AND t.PROCESSLIST_ID IS NOT NULL
  AND t.PROCESSLIST_USER IS NOT NULL
GROUP BY t.PROCESSLIST_ID, t.PROCESSLIST_USER, t.PROCESSLIST_HOST,
         t.PROCESSLIST_COMMAND, t.PROCESSLIST_STATE
ORDER BY io_wait_timer DESC, t.PROCESSLIST_ID
LIMIT ?";

static TABLE: Table = Table {
    name: "io_sessions_history",
    columns: &[
        Column::integer("sid"),
        Column::text("username"),
        Column::text("host"),
        Column::text("command"),
        Column::text("state"),
        Column::integer("io_waits"),
        Column::real("io_wait_seconds"),
        Column::integer("rows_read"),
        Column::integer("rows_written"),
    ],
    indexed: &["sid"],
};

/// Client sessions ranked by time spent waiting on file and table I/O
/// (requires `performance_schema`).
#[derive(Clone, Debug, Default)]
pub struct IoSessions;

impl IoSessions {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(row: &Row) -> Record {
        let wait = row.f64("io_wait_timer").unwrap_or(0.0);
        record([
            ("sid", json!(row.i64("sid").unwrap_or(0))),
            ("username", json!(row.text_or("username", NOT_AVAILABLE))),
            ("host", json!(row.text_or("host", NOT_AVAILABLE))),
            ("command", json!(row.text_or("command", NOT_AVAILABLE))),
            ("state", json!(row.text_or("state", NOT_AVAILABLE))),
            ("io_waits", json!(row.i64("io_waits").unwrap_or(0))),
            ("io_wait_seconds", json!(round2(wait / PICOS_PER_SECOND))),
            ("rows_read", json!(row.i64("rows_read").unwrap_or(0))),
            ("rows_written", json!(row.i64("rows_written").unwrap_or(0))),
        ])
    }
}

impl Metric for IoSessions {
    fn name(&self) -> &'static str {
        "io_sessions"
    }

    fn display_name(&self) -> &'static str {
        "I/O Sessions"
    }

    fn description(&self) -> &'static str {
        "Session-level I/O waits and row traffic"
    }

    fn category(&self) -> Category {
        Category::Performance
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(SESSIONS_KEY)
    }

    #[instrument(skip(self, source, params), level = "info", fields(metric = "io_sessions", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source
                .fetch_all(IO_SESSIONS_SQL, &[params.limit.into()])
                .await?;

            Ok(Some(Payload::list(
                SESSIONS_KEY,
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
            ("Sessions", payload.count().to_string()),
            (
                "Top Session",
                top.get("sid").and_then(Value::as_i64).unwrap_or(0).to_string(),
            ),
            (
                "Top I/O Wait (sec)",
                format!(
                    "{:.2}",
                    top.get("io_wait_seconds")
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
