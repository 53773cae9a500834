#![allow(dead_code)]

use anyhow::Result;
use futures::future::BoxFuture;
use mariadb_monitor::metrics::payload::record;
use mariadb_monitor::metrics::{
    Category, CollectParams, CollectionError, Metric, MetricRegistry, Param, Payload,
    PayloadShape, QueryError, QuerySource, Record, Row,
};
use mariadb_monitor::store::{Column, HistoryStore, Table};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Mutex;

/// Canned rows keyed by a substring of the statement; unknown statements fail.
#[derive(Default)]
pub struct FakeSource {
    responses: Vec<(&'static str, Vec<Row>)>,
    issued: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, needle: &'static str, rows: Vec<Row>) -> Self {
        self.responses.push((needle, rows));
        self
    }

    pub fn issued(&self) -> Vec<String> {
        self.issued
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl QuerySource for FakeSource {
    fn fetch_all<'a>(
        &'a self,
        sql: &'a str,
        _params: &'a [Param],
    ) -> BoxFuture<'a, Result<Vec<Row>, QueryError>> {
        Box::pin(async move {
            if let Ok(mut issued) = self.issued.lock() {
                issued.push(sql.to_string());
            }

            self.responses
                .iter()
                .find(|(needle, _)| sql.contains(needle))
                .map(|(_, rows)| rows.clone())
                .ok_or_else(|| QueryError::Backend(format!("unexpected statement: {sql}")))
        })
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().cloned().collect()
}

#[derive(Clone, Copy, Debug)]
pub enum Behaviour {
    /// One flat record.
    Scalar,
    /// `n` records under the `items` key.
    List(usize),
    /// An empty list under the `items` key.
    EmptyList,
    /// An empty scalar record.
    EmptyScalar,
    /// `Ok(None)`
    Nothing,
    /// A backend error.
    Fail,
    /// Whatever the backend returns for `SELECT fake`.
    Query,
}

pub static SCALAR_TABLE: Table = Table {
    name: "fake_scalar_history",
    columns: &[
        Column::integer("sessions"),
        Column::real("ratio"),
        Column::text("state"),
    ],
    indexed: &[],
};

pub static LIST_TABLE: Table = Table {
    name: "fake_list_history",
    columns: &[Column::integer("sid"), Column::text("username")],
    indexed: &["sid"],
};

/// Configurable metric used to drive the registry.
pub struct FakeMetric {
    name: &'static str,
    category: Category,
    behaviour: Behaviour,
    enabled_by_default: bool,
}

impl FakeMetric {
    pub const fn new(name: &'static str, category: Category, behaviour: Behaviour) -> Self {
        Self {
            name,
            category,
            behaviour,
            enabled_by_default: true,
        }
    }

    pub const fn disabled_by_default(mut self) -> Self {
        self.enabled_by_default = false;
        self
    }

    pub fn boxed(self) -> Box<dyn Metric> {
        Box::new(self)
    }

    const fn is_list(&self) -> bool {
        matches!(self.behaviour, Behaviour::List(_) | Behaviour::EmptyList)
    }
}

pub fn scalar_record() -> Record {
    record([
        ("sessions", json!(42)),
        ("ratio", json!(0.75)),
        ("state", json!("ok")),
    ])
}

pub fn list_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            record([
                ("sid", json!(i + 1)),
                ("username", json!(format!("user{}", i + 1))),
            ])
        })
        .collect()
}

impl Metric for FakeMetric {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "fake metric"
    }

    fn category(&self) -> Category {
        self.category
    }

    fn shape(&self) -> PayloadShape {
        if self.is_list() {
            PayloadShape::RecordList("items")
        } else {
            PayloadShape::ScalarRecord
        }
    }

    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move {
            match self.behaviour {
                Behaviour::Scalar => Ok(Some(Payload::scalar(scalar_record()))),
                Behaviour::List(n) => Ok(Some(Payload::list("items", list_records(n)))),
                Behaviour::EmptyList => Ok(Some(Payload::list("items", Vec::new()))),
                Behaviour::EmptyScalar => Ok(Some(Payload::scalar(Record::new()))),
                Behaviour::Nothing => Ok(None),
                Behaviour::Fail => Err(CollectionError::Query(QueryError::Backend(
                    "connection reset".to_string(),
                ))),
                Behaviour::Query => {
                    let rows = source.fetch_all("SELECT fake", &[]).await?;
                    Ok(rows
                        .into_iter()
                        .next()
                        .map(|row| Payload::scalar(row.into_record())))
                }
            }
        })
    }

    fn table(&self) -> Option<&'static Table> {
        if self.is_list() {
            Some(&LIST_TABLE)
        } else {
            Some(&SCALAR_TABLE)
        }
    }

    fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }
}

/// Registry holding the given metrics, logging under `dir`.
pub fn registry(dir: &Path, metrics: Vec<Box<dyn Metric>>) -> Result<MetricRegistry> {
    let mut registry = MetricRegistry::new(dir)?;
    for metric in metrics {
        registry.register(metric)?;
    }
    Ok(registry)
}

/// In-memory store with every table of `registry` created.
pub async fn store(registry: &MetricRegistry) -> Result<HistoryStore> {
    let store = HistoryStore::in_memory().await?;
    registry.init_storage(&store).await?;
    Ok(store)
}

/// Every JSON line of a metric log.
pub fn read_log(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}
