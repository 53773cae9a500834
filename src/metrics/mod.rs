//! Metric plugin framework.
//!
//! A [`Metric`] turns read-only diagnostic queries into a typed [`Payload`]
//! and declares the history table it is stored in. The
//! [`registry::MetricRegistry`] owns every metric and fans collection,
//! logging and persistence out over them.

use crate::store::{HistoryStore, Table};
use anyhow::Result;
use futures::future::BoxFuture;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[macro_use]
mod register_macro;

pub mod config;
pub mod error;
pub mod journal;
pub mod payload;
pub mod registry;
pub mod source;
pub mod stats;
pub mod util;

pub use config::MetricConfig;
pub use error::{CollectionError, QueryError};
pub use payload::{Payload, PayloadShape, Record, Summary};
pub use registry::{FanoutReport, MetricHandle, MetricRegistry, Sample};
pub use source::{Param, QuerySource, Row};

/// Value written for text columns the server reports as NULL.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Sessions,
    Storage,
    Performance,
    System,
}

impl Category {
    pub const ALL: [Self; 4] = [
        Self::Sessions,
        Self::Storage,
        Self::Performance,
        Self::System,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Storage => "storage",
            Self::Performance => "performance",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown metric category: {s}"))
    }
}

/// Per-pass collection parameters handed to every metric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectParams {
    /// Upper bound on rows returned by list metrics.
    pub limit: u32,
    /// Budget for a single metric's `collect`.
    pub timeout: Duration,
    /// Schemas skipped by storage metrics.
    pub excluded_schemas: Vec<String>,
}

pub const DEFAULT_LIMIT: u32 = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EXCLUDED_SCHEMAS: [&str; 4] = [
    "information_schema",
    "performance_schema",
    "mysql",
    "sys",
];

impl Default for CollectParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            excluded_schemas: DEFAULT_EXCLUDED_SCHEMAS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl CollectParams {
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_excluded_schemas(mut self, schemas: Vec<String>) -> Self {
        self.excluded_schemas = util::clean_list(schemas);
        self
    }

    #[must_use]
    pub fn is_schema_excluded(&self, schema: &str) -> bool {
        self.excluded_schemas.iter().any(|s| s == schema)
    }
}

pub trait Metric: Send + Sync {
    /// Stable `snake_case` identity, unique within a registry.
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn category(&self) -> Category;

    fn shape(&self) -> PayloadShape;

    /// Run the metric's diagnostic queries.
    ///
    /// `Ok(None)` means "nothing to report this cycle". Backend failures are
    /// returned as errors, never raised as panics.
    fn collect<'a>(
        &'a self,
        source: &'a dyn QuerySource,
        params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>>;

    /// History table this metric writes, if any.
    fn table(&self) -> Option<&'static Table> {
        None
    }

    fn storage_schema(&self) -> Option<String> {
        self.table().map(Table::create_sql)
    }

    fn storage_indexes(&self) -> Vec<String> {
        self.table().map(Table::index_sql).unwrap_or_default()
    }

    /// Store one row per record of `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the history write fails.
    fn persist<'a>(
        &'a self,
        store: &'a HistoryStore,
        payload: &'a Payload,
        sample_id: &'a str,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            match self.table() {
                Some(table) if !payload.is_empty() => {
                    store.insert(table, payload.records(), sample_id).await
                }
                _ => Ok(0),
            }
        })
    }

    /// Latest stored rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history read fails.
    fn fetch_history<'a>(
        &'a self,
        store: &'a HistoryStore,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Record>>> {
        Box::pin(async move {
            match self.table() {
                Some(table) => store.fetch_recent(table, limit).await,
                None => Ok(Vec::new()),
            }
        })
    }

    /// Ordered label/value projection for display.
    fn summarize(&self, _payload: &Payload) -> Option<Summary> {
        None
    }

    fn enabled_by_default(&self) -> bool {
        true
    }
}

register_metrics! {
    session_overview => SessionOverview,
    top_sessions => TopSessions,
    blocking_sessions => BlockingSessions,
    tablespace_usage => TablespaceUsage,
    temp_usage => TempUsage,
    undo_metrics => UndoMetrics,
    wait_events => WaitEvents,
    redo_metrics => RedoMetrics,
    plan_churn => PlanChurn,
    io_sessions => IoSessions,
    resource_limits => ResourceLimits,
    host_metrics => HostMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().ok(), Some(category));
        }
        assert_eq!("Sessions".parse::<Category>().ok(), Some(Category::Sessions));
        assert!("network".parse::<Category>().is_err());
    }

    #[test]
    fn test_collect_params_defaults() {
        let params = CollectParams::default();

        assert_eq!(params.limit, 20);
        assert_eq!(params.timeout, Duration::from_secs(30));
        assert!(params.is_schema_excluded("mysql"));
        assert!(!params.is_schema_excluded("app"));
    }

    #[test]
    fn test_collect_params_builders() {
        let params = CollectParams::default()
            .with_limit(5)
            .with_timeout(Duration::from_millis(250))
            .with_excluded_schemas(vec![" sys ".into(), String::new(), "sys".into()]);

        assert_eq!(params.limit, 5);
        assert_eq!(params.timeout, Duration::from_millis(250));
        assert_eq!(params.excluded_schemas, vec!["sys".to_string()]);
        assert!(!params.is_schema_excluded("mysql"));
    }
}
