use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, NOT_AVAILABLE, Payload, PayloadShape,
    QuerySource, Row, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::instrument;

const SESSIONS_KEY: &str = "sessions";

const TOP_SESSIONS_SQL: &str = r"
SELECT
    p.ID AS sid,
    p.USER AS username,
    p.HOST AS host,
    p.DB AS db,
    p.COMMAND AS command,
    p.STATE AS state,
    p.TIME AS elapsed_seconds,
    p.MEMORY_USED AS memory_used,
    p.EXAMINED_ROWS AS examined_rows,
    LEFT(p.INFO, 200) AS query
FROM information_schema.PROCESSLIST p
WHERE p.USER NOT IN ('system user', 'event_scheduler')
  AND p.ID <> CONNECTION_ID()
ORDER BY p.TIME DESC, p.ID
LIMIT ?";

static TABLE: Table = Table {
    name: "top_sessions_history",
    columns: &[
        Column::integer("sid"),
        Column::text("username"),
        Column::text("host"),
        Column::text("db"),
        Column::text("command"),
        Column::text("state"),
        Column::integer("elapsed_seconds"),
        Column::real("memory_mb"),
        Column::integer("examined_rows"),
        Column::text("query"),
    ],
    indexed: &["sid"],
};

/// Longest running client sessions.
#[derive(Clone, Debug, Default)]
pub struct TopSessions;

impl TopSessions {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(row: &Row) -> Record {
        let memory_mb = row.f64("memory_used").unwrap_or(0.0) / (1024.0 * 1024.0);
        record([
            ("sid", json!(row.i64("sid").unwrap_or(0))),
            ("username", json!(row.text_or("username", NOT_AVAILABLE))),
            ("host", json!(row.text_or("host", NOT_AVAILABLE))),
            ("db", json!(row.text_or("db", NOT_AVAILABLE))),
            ("command", json!(row.text_or("command", NOT_AVAILABLE))),
            ("state", json!(row.text_or("state", NOT_AVAILABLE))),
            ("elapsed_seconds", json!(row.i64("elapsed_seconds").unwrap_or(0))),
            ("memory_mb", json!(round2(memory_mb))),
            ("examined_rows", json!(row.i64("examined_rows").unwrap_or(0))),
            ("query", json!(row.text_or("query", NOT_AVAILABLE))),
        ])
    }
}

impl Metric for TopSessions {
    fn name(&self) -> &'static str {
        "top_sessions"
    }

    fn display_name(&self) -> &'static str {
        "Top Sessions"
    }

    fn description(&self) -> &'static str {
        "Client sessions ordered by time spent in their current command"
    }

    fn category(&self) -> Category {
        Category::Sessions
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(SESSIONS_KEY)
    }

    #[instrument(skip(self, source, params), level = "info", fields(metric = "top_sessions", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source
                .fetch_all(TOP_SESSIONS_SQL, &[params.limit.into()])
                .await?;

            let sessions = rows.iter().map(Self::to_record).collect();

            Ok(Some(Payload::list(SESSIONS_KEY, sessions)))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let sessions = payload.records();
        let longest = sessions.first()?;

        Some(vec![
            ("Sessions", sessions.len().to_string()),
            (
                "Longest (sec)",
                longest
                    .get("elapsed_seconds")
                    .and_then(serde_json::Value::as_i64)
                    .unwrap_or(0)
                    .to_string(),
            ),
            (
                "Longest User",
                longest
                    .get("username")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or(NOT_AVAILABLE)
                    .to_string(),
            ),
        ])
    }
}
