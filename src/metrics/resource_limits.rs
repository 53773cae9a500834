use crate::metrics::payload::{Record, record, round2};
use crate::metrics::source::name_values;
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, Payload, PayloadShape, QuerySource, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, instrument};

const LIMITS_KEY: &str = "limits";

const STATUS_SQL: &str = r"
SELECT VARIABLE_NAME AS name, VARIABLE_VALUE AS value
FROM information_schema.GLOBAL_STATUS
WHERE VARIABLE_NAME IN ('THREADS_CONNECTED', 'MAX_USED_CONNECTIONS', 'OPEN_FILES', 'OPEN_TABLES')";

const VARIABLES_SQL: &str = r"
SELECT VARIABLE_NAME AS name, VARIABLE_VALUE AS value
FROM information_schema.GLOBAL_VARIABLES
WHERE VARIABLE_NAME IN ('MAX_CONNECTIONS', 'OPEN_FILES_LIMIT', 'TABLE_OPEN_CACHE')";

/// `(resource, in-use status, peak status, limit variable)`
const RESOURCES: [(&str, &str, Option<&str>, &str); 3] = [
    (
        "connections",
        "threads_connected",
        Some("max_used_connections"),
        "max_connections",
    ),
    ("open_files", "open_files", None, "open_files_limit"),
    ("table_cache", "open_tables", None, "table_open_cache"),
];

static TABLE: Table = Table {
    name: "resource_limits_history",
    columns: &[
        Column::text("resource"),
        Column::integer("in_use"),
        Column::integer("peak"),
        Column::integer("max_allowed"),
        Column::real("pct_used"),
    ],
    indexed: &["resource"],
};

/// Server resources measured against their configured ceilings.
#[derive(Clone, Debug, Default)]
pub struct ResourceLimits;

impl ResourceLimits {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_record(
    resource: &str,
    in_use: f64,
    peak: f64,
    max_allowed: Option<f64>,
) -> Record {
    let pct_used = match max_allowed {
        Some(limit) if limit > 0.0 => in_use / limit * 100.0,
        _ => 0.0,
    };

    record([
        ("resource", json!(resource)),
        ("in_use", json!(in_use as i64)),
        ("peak", json!(peak as i64)),
        ("max_allowed", max_allowed.map_or(Value::Null, |l| json!(l as i64))),
        ("pct_used", json!(round2(pct_used))),
    ])
}

fn limits(status: &HashMap<String, f64>, variables: &HashMap<String, f64>) -> Vec<Record> {
    RESOURCES
        .iter()
        .filter_map(|(resource, in_use, peak, limit)| {
            let Some(current) = status.get(*in_use).copied() else {
                debug!(resource, "Status counter not reported, skipping");
                return None;
            };
            let peak = peak
                .and_then(|p| status.get(p).copied())
                .unwrap_or(current);
            Some(to_record(
                resource,
                current,
                peak,
                variables.get(*limit).copied(),
            ))
        })
        .collect()
}

impl Metric for ResourceLimits {
    fn name(&self) -> &'static str {
        "resource_limits"
    }

    fn display_name(&self) -> &'static str {
        "Resource Limits"
    }

    fn description(&self) -> &'static str {
        "Connections, open files and table cache against configured limits"
    }

    fn category(&self) -> Category {
        Category::System
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::RecordList(LIMITS_KEY)
    }

    #[instrument(skip(self, source, _params), level = "info", fields(metric = "resource_limits", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            let status = name_values(&source.fetch_all(STATUS_SQL, &[]).await?);
            let variables = name_values(&source.fetch_all(VARIABLES_SQL, &[]).await?);

            Ok(Some(Payload::list(LIMITS_KEY, limits(&status, &variables))))
        })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let mut summary = Summary::new();
        for limit in payload.records() {
            let label = match limit.get("resource").and_then(Value::as_str) {
                Some("connections") => "Connections (%)",
                Some("open_files") => "Open Files (%)",
                Some("table_cache") => "Table Cache (%)",
                _ => continue,
            };
            let pct = limit.get("pct_used").and_then(Value::as_f64).unwrap_or(0.0);
            summary.push((label, format!("{pct:.1}")));
        }

        (!summary.is_empty()).then_some(summary)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::metrics::source::testing::{StaticSource, row};

    fn pair(name: &str, value: &str) -> crate::metrics::Row {
        row(&[("name", json!(name)), ("value", json!(value))])
    }

    #[tokio::test]
    async fn test_collect() {
        let source = StaticSource::new()
            .rows(
                "GLOBAL_STATUS",
                vec![
                    pair("THREADS_CONNECTED", "38"),
                    pair("MAX_USED_CONNECTIONS", "120"),
                    pair("OPEN_FILES", "50"),
                    pair("OPEN_TABLES", "1800"),
                ],
            )
            .rows(
                "GLOBAL_VARIABLES",
                vec![
                    pair("MAX_CONNECTIONS", "151"),
                    pair("OPEN_FILES_LIMIT", "0"),
                    pair("TABLE_OPEN_CACHE", "2000"),
                ],
            );

        let payload = match ResourceLimits::new()
            .collect(&source, &CollectParams::default())
            .await
        {
            Ok(Some(payload)) => payload,
            other => panic!("expected a payload, got {other:?}"),
        };

        assert_eq!(payload.count(), 3);

        let connections = payload.records().first().cloned().unwrap_or_default();
        assert_eq!(connections["in_use"], json!(38));
        assert_eq!(connections["peak"], json!(120));
        assert_eq!(connections["max_allowed"], json!(151));
        assert_eq!(connections["pct_used"], json!(25.17));

        // a zero limit means unlimited
        let files = payload.records().get(1).cloned().unwrap_or_default();
        assert_eq!(files["pct_used"], json!(0.0));
        assert_eq!(files["peak"], json!(50));

        let summary = ResourceLimits::new().summarize(&payload).unwrap_or_default();
        assert_eq!(summary.last(), Some(&("Table Cache (%)", "90.0".to_string())));
    }

    #[tokio::test]
    async fn test_unreported_counters_are_skipped() {
        let source = StaticSource::new()
            .rows("GLOBAL_STATUS", vec![pair("OPEN_TABLES", "10")])
            .rows("GLOBAL_VARIABLES", Vec::new());

        let result = ResourceLimits::new()
            .collect(&source, &CollectParams::default())
            .await;
        let payload = result.ok().flatten().unwrap_or_else(|| Payload::list(LIMITS_KEY, Vec::new()));

        assert_eq!(payload.count(), 1);
        let cache = payload.records().first().cloned().unwrap_or_default();
        assert_eq!(cache["resource"], json!("table_cache"));
        assert_eq!(cache["max_allowed"], Value::Null);
    }
}
