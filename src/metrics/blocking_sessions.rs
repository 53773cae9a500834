use crate::metrics::payload::{Record, record};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, NOT_AVAILABLE, Payload, PayloadShape,
    QuerySource, Row, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::instrument;

const BLOCKING_KEY: &str = "blocking_sessions";

const BLOCKING_SQL: &str = r"
SELECT
    bt.trx_mysql_thread_id AS blocking_sid,
    bp.USER AS blocking_user,
    bp.HOST AS blocking_host,
    rt.trx_mysql_thread_id AS blocked_sid,
    rp.USER AS blocked_user,
    rp.HOST AS blocked_host,
    LEFT(rt.trx_query, 200) AS blocked_query,
    TIMESTAMPDIFF(SECOND, rt.trx_wait_started, NOW()) AS wait_seconds
FROM information_schema.INNODB_LOCK_WAITS w
JOIN information_schema.INNODB_TRX bt ON bt.trx_id = w.blocking_trx_id
JOIN information_schema.INNODB_TRX rt ON rt.trx_id = w.requesting_trx_id
LEFT JOIN information_schema.PROCESSLIST bp ON bp.ID = bt.trx_mysql_thread_id
LEFT JOIN information_schema.PROCESSLIST rp ON rp.ID = rt.trx_mysql_thread_id
ORDER BY wait_seconds DESC";

static TABLE: Table = Table {
    name: "blocking_sessions_history",
    columns: &[
        Column::integer("blocking_sid"),
        Column::text("blocking_user"),
        Column::text("blocking_host"),
        Column::integer("blocked_sid"),
        Column::text("blocked_user"),
        Column::text("blocked_host"),
        Column::text("blocked_query"),
        Column::integer("wait_seconds"),
    ],
    indexed: &["blocking_sid"],
};

/// Lock waits between InnoDB transactions: who blocks whom and for how long.
#[derive(Clone, Debug, Default)]
pub struct BlockingSessions;

impl BlockingSessions {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn to_record(row: &Row) -> Record {
        record([
            ("blocking_sid", json!(row.i64("blocking_sid").unwrap_or(0))),
            ("blocking_user", json!(row.text_or("blocking_user", NOT_AVAILABLE))),
            ("blocking_host", json!(row.text_or("blocking_host", NOT_AVAILABLE))),
            ("blocked_sid", json!(row.i64("blocked_sid").unwrap_or(0))),
            ("blocked_user", json!(row.text_or("blocked_user", NOT_AVAILABLE))),
            ("blocked_host", json!(row.text_or("blocked_host", NOT_AVAILABLE))),
            ("blocked_query", json!(row.text_or("blocked_query", NOT_AVAILABLE))),
            ("wait_seconds", json!(row.i64("wait_seconds").unwrap_or(0))),
        ])
    }
}

impl Metric for BlockingSessions {
    fn name(&self) -> &'static str {
        "blocking_sessions"
    }

    fn display_name(&self) -> &'static str {
        "Blocking Sessions"
    }

    fn description(&self) -> &'static str {
        "Sessions waiting on row locks held by other sessions"
    }

    fn category(&self) -> Category {
        Category::Sessions
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(BLOCKING_KEY)
    }

    #[instrument(skip(self, source, _params), level = "info", fields(metric = "blocking_sessions", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let rows = source.fetch_all(BLOCKING_SQL, &[]).await?;
            let blocking = rows.iter().map(Self::to_record).collect();

            Ok(Some(Payload::list(BLOCKING_KEY, blocking)))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let waits = payload.records();
        let longest = waits
            .iter()
            .filter_map(|w| w.get("wait_seconds").and_then(Value::as_i64))
            .max()
            .unwrap_or(0);
        let blockers = waits
            .iter()
            .filter_map(|w| w.get("blocking_sid").and_then(Value::as_i64))
            .collect::<std::collections::BTreeSet<_>>()
            .len();

        Some(vec![
            ("Blocked Sessions", waits.len().to_string()),
            ("Blockers", blockers.to_string()),
            ("Longest Wait (sec)", longest.to_string()),
        ])
    }
}
