use crate::metrics::payload::record;
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, Payload, PayloadShape, QuerySource, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::instrument;

const TRANSACTIONS_SQL: &str = r"
SELECT
    COUNT(*) AS active_transactions,
    COALESCE(MAX(TIMESTAMPDIFF(SECOND, trx_started, NOW())), 0) AS oldest_trx_seconds,
    CAST(COALESCE(SUM(trx_rows_modified), 0) AS SIGNED) AS rows_modified
FROM information_schema.INNODB_TRX";

const HISTORY_SQL: &str = r"
SELECT COUNT AS history_list_length
FROM information_schema.INNODB_METRICS
WHERE NAME = 'trx_rseg_history_len'";

static TABLE: Table = Table {
    name: "undo_metrics_history",
    columns: &[
        Column::integer("active_transactions"),
        Column::integer("oldest_trx_seconds"),
        Column::integer("rows_modified"),
        Column::integer("history_list_length"),
    ],
    indexed: &[],
};

/// Undo pressure: open transactions and the purge backlog they cause.
#[derive(Clone, Debug, Default)]
pub struct UndoMetrics;

impl UndoMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Metric for UndoMetrics {
    fn name(&self) -> &'static str {
        "undo_metrics"
    }

    fn display_name(&self) -> &'static str {
        "Undo Metrics"
    }

    fn description(&self) -> &'static str {
        "Active transactions, oldest transaction age and purge history length"
    }

    fn category(&self) -> Category {
        Category::Storage
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::ScalarRecord
    }

    #[instrument(skip(self, source, _params), level = "info", fields(metric = "undo_metrics", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let transactions = source.fetch_all(TRANSACTIONS_SQL, &[]).await?;
            let Some(trx) = transactions.first() else {
                return Ok(None);
            };

            let history = source
                .fetch_all(HISTORY_SQL, &[])
                .await?
                .first()
                .and_then(|row| row.i64("history_list_length"))
                .ok_or(CollectionError::MissingStatistic("trx_rseg_history_len"))?;

            Ok(Some(Payload::scalar(record([
                (
                    "active_transactions",
                    json!(trx.i64("active_transactions").unwrap_or(0)),
                ),
                (
                    "oldest_trx_seconds",
                    json!(trx.i64("oldest_trx_seconds").unwrap_or(0)),
                ),
                ("rows_modified", json!(trx.i64("rows_modified").unwrap_or(0))),
                ("history_list_length", json!(history)),
            ]))))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let value = |field| payload.field_i64(field).unwrap_or(0).to_string();
        Some(vec![
            ("Active Transactions", value("active_transactions")),
            ("Oldest (sec)", value("oldest_trx_seconds")),
            ("History Length", value("history_list_length")),
        ])
    }
}
