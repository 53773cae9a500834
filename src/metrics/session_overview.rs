use crate::metrics::payload::{record, round2};
use crate::metrics::source::name_values;
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, Payload, PayloadShape, QuerySource, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, instrument};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const PAGE_SIZE_SQL: &str = "SELECT @@innodb_page_size AS page_size";

const SESSIONS_SQL: &str = r"
SELECT
    COUNT(*) AS total_sessions,
    CAST(COALESCE(SUM(p.COMMAND <> 'Sleep'), 0) AS SIGNED) AS active_sessions,
    CAST(COALESCE(SUM(p.COMMAND = 'Sleep'), 0) AS SIGNED) AS inactive_sessions,
    CAST(COALESCE(SUM(CASE WHEN p.COMMAND <> 'Sleep' THEN p.TIME ELSE 0 END), 0) AS SIGNED) AS active_seconds
FROM information_schema.PROCESSLIST p
WHERE p.USER NOT IN ('system user', 'event_scheduler')
  AND p.ID <> CONNECTION_ID()";

const BLOCKED_SQL: &str = r"
SELECT COUNT(DISTINCT w.requesting_trx_id) AS blocked_sessions
FROM information_schema.INNODB_LOCK_WAITS w";

const READS_SQL: &str = r"
SELECT VARIABLE_NAME AS name, VARIABLE_VALUE AS value
FROM information_schema.GLOBAL_STATUS
WHERE VARIABLE_NAME IN ('INNODB_BUFFER_POOL_READ_REQUESTS', 'INNODB_PAGES_READ')";

static TABLE: Table = Table {
    name: "session_overview_history",
    columns: &[
        Column::integer("total_sessions"),
        Column::integer("active_sessions"),
        Column::integer("inactive_sessions"),
        Column::integer("blocked_sessions"),
        Column::real("logical_reads_mb"),
        Column::real("physical_reads_mb"),
        Column::integer("active_seconds"),
    ],
    indexed: &[],
};

/// Session counts plus buffer pool read volume.
#[derive(Clone, Debug, Default)]
pub struct SessionOverview;

impl SessionOverview {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn page_size(source: &dyn QuerySource) -> Result<f64, CollectionError> {
        let rows = source.fetch_all(PAGE_SIZE_SQL, &[]).await?;
        rows.first()
            .and_then(|row| row.f64("page_size"))
            .filter(|size| *size > 0.0)
            .ok_or(CollectionError::MissingStatistic("innodb_page_size"))
    }
}

impl Metric for SessionOverview {
    fn name(&self) -> &'static str {
        "session_overview"
    }

    fn display_name(&self) -> &'static str {
        "Session Overview"
    }

    fn description(&self) -> &'static str {
        "Overall session statistics including counts, blocking and buffer pool reads"
    }

    fn category(&self) -> Category {
        Category::Sessions
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::ScalarRecord
    }

    #[instrument(skip(self, source, _params), level = "info", fields(metric = "session_overview", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            // Statistic lookup first: without a page size reads cannot be sized.
            let page_size = Self::page_size(source).await?;

            let sessions = source.fetch_all(SESSIONS_SQL, &[]).await?;
            let Some(row) = sessions.first() else {
                debug!("processlist returned no rows");
                return Ok(None);
            };

            let blocked = source
                .fetch_all(BLOCKED_SQL, &[])
                .await?
                .first()
                .and_then(|row| row.i64("blocked_sessions"))
                .unwrap_or(0);

            let reads = name_values(&source.fetch_all(READS_SQL, &[]).await?);
            let mb = |status: &str| {
                round2(reads.get(status).copied().unwrap_or(0.0) * page_size / BYTES_PER_MB)
            };

            Ok(Some(Payload::scalar(record([
                ("total_sessions", json!(row.i64("total_sessions").unwrap_or(0))),
                ("active_sessions", json!(row.i64("active_sessions").unwrap_or(0))),
                ("inactive_sessions", json!(row.i64("inactive_sessions").unwrap_or(0))),
                ("blocked_sessions", json!(blocked)),
                ("logical_reads_mb", json!(mb("innodb_buffer_pool_read_requests"))),
                ("physical_reads_mb", json!(mb("innodb_pages_read"))),
                ("active_seconds", json!(row.i64("active_seconds").unwrap_or(0))),
            ]))))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let count = |field| payload.field_i64(field).unwrap_or(0).to_string();
        Some(vec![
            ("Total Sessions", count("total_sessions")),
            ("Active", count("active_sessions")),
            ("Inactive", count("inactive_sessions")),
            ("Blocked", count("blocked_sessions")),
            ("Active Time (sec)", count("active_seconds")),
            (
                "Logical Reads (MB)",
                format!("{:.1}", payload.field_f64("logical_reads_mb").unwrap_or(0.0)),
            ),
        ])
    }
}
