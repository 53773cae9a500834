//! Read-only query capability injected into every metric.
//!
//! Metrics never see a driver type: they hand SQL text and bind parameters to
//! a [`QuerySource`] and get back loosely typed [`Row`]s. Production uses the
//! shared `MySqlPool`; tests plug in canned in-memory sources.

use crate::metrics::error::QueryError;
use crate::metrics::payload::Record;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, MySqlPool, Row as _};
use tracing::info_span;
use tracing_futures::Instrument as _;

/// Bind parameter for a diagnostic query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Param {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

pub trait QuerySource: Send + Sync {
    /// Run one read-only statement and return every row.
    fn fetch_all<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Param],
    ) -> BoxFuture<'a, Result<Vec<Row>, QueryError>>;
}

/// One result row, column name -> value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl Row {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|v| !v.is_null())
    }

    /// Integer value; numeric strings (`DECIMAL`, status variables) are parsed.
    #[must_use]
    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(value_as_i64)
    }

    #[must_use]
    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(value_as_f64)
    }

    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Text value, or `default` when the column is NULL or missing.
    #[must_use]
    pub fn text_or(&self, column: &str, default: &str) -> String {
        self.text(column).unwrap_or(default).to_string()
    }

    #[must_use]
    pub fn into_record(self) -> Record {
        self.0
    }

    fn from_mysql(row: &MySqlRow) -> Self {
        row.columns()
            .iter()
            .map(|column| (column.name().to_string(), decode_column(row, column.ordinal())))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Collapse `name`/`value` rows (`GLOBAL_STATUS`, `GLOBAL_VARIABLES`) into a
/// lookup keyed by lowercase name. Non-numeric values are dropped.
#[must_use]
pub fn name_values(rows: &[Row]) -> HashMap<String, f64> {
    rows.iter()
        .filter_map(|row| Some((row.text("name")?.to_ascii_lowercase(), row.f64("value")?)))
        .collect()
}

/// Lenient integer conversion shared by query rows and the history store.
#[must_use]
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|v| i64::try_from(v).ok()))
            .or_else(|| n.as_f64().map(truncate)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(truncate)),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[must_use]
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn truncate(value: f64) -> i64 {
    value as i64
}

// NULL decodes as Ok(None) for any candidate type, so the first probe wins.
fn decode_column(row: &MySqlRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(Value::Null, Value::from);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return value.map_or(Value::Null, |bytes| {
            Value::from(String::from_utf8_lossy(&bytes).into_owned())
        });
    }
    Value::Null
}

fn statement_label(sql: &str) -> &str {
    sql.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
}

impl QuerySource for MySqlPool {
    fn fetch_all<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Param],
    ) -> BoxFuture<'a, Result<Vec<Row>, QueryError>> {
        Box::pin(async move {
            let span = info_span!(
                "db.query",
                db.system = "mysql",
                db.operation = "SELECT",
                db.statement = statement_label(sql),
                otel.kind = "client"
            );

            let mut query = sqlx::query(sql);
            for param in params {
                query = match param {
                    Param::Int(value) => query.bind(*value),
                    Param::Text(value) => query.bind(value.as_str()),
                };
            }

            let rows = query.fetch_all(self).instrument(span).await?;

            Ok(rows.iter().map(Row::from_mysql).collect())
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Param, QuerySource, Row};
    use crate::metrics::error::QueryError;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    type Response = Result<Vec<Row>, String>;

    pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs.iter().cloned().collect()
    }

    /// Canned responses keyed by a substring of the statement.
    #[derive(Default)]
    pub struct StaticSource {
        responses: Vec<(&'static str, Response)>,
        issued: Mutex<Vec<(String, Vec<Param>)>>,
    }

    impl StaticSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn rows(mut self, needle: &'static str, rows: Vec<Row>) -> Self {
            self.responses.push((needle, Ok(rows)));
            self
        }

        pub fn fail(mut self, needle: &'static str, message: &str) -> Self {
            self.responses.push((needle, Err(message.to_string())));
            self
        }

        pub fn issued(&self) -> Vec<(String, Vec<Param>)> {
            self.issued
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default()
        }
    }

    impl QuerySource for StaticSource {
        fn fetch_all<'a>(
            &'a self,
            sql: &'a str,
            params: &'a [Param],
        ) -> BoxFuture<'a, Result<Vec<Row>, QueryError>> {
            Box::pin(async move {
                if let Ok(mut issued) = self.issued.lock() {
                    issued.push((sql.to_string(), params.to_vec()));
                }

                let response = self
                    .responses
                    .iter()
                    .find(|(needle, _)| sql.contains(needle))
                    .map(|(_, response)| response.clone());

                match response {
                    Some(Ok(rows)) => Ok(rows),
                    Some(Err(message)) => Err(QueryError::Backend(message)),
                    None => Err(QueryError::Backend(format!("no canned rows for: {sql}"))),
                }
            })
        }
    }
}
