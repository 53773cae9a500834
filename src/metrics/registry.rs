//! Metric registry: owns every metric, indexes it by name and category and
//! fans collection, logging and persistence out over the enabled set.
//!
//! Failure isolation is the point of this module. A metric that errors, times
//! out, panics or returns a payload of the wrong shape is logged and left out
//! of the sample; every other metric still reports.

use crate::metrics::journal::MetricLog;
use crate::metrics::stats::SampleStats;
use crate::metrics::util::{now_iso, resolve_sample_id};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, MetricConfig, Payload, QuerySource, Summary,
    all_factories,
};
use crate::store::HistoryStore;
use anyhow::{Context, Result};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

/// A registered metric plus the state the registry keeps for it.
pub struct MetricHandle {
    metric: Box<dyn Metric>,
    enabled: AtomicBool,
    journal: MetricLog,
}

impl MetricHandle {
    /// # Errors
    ///
    /// Returns an error if the metric's log file cannot be opened.
    pub fn new(metric: Box<dyn Metric>, log_dir: &Path) -> Result<Self> {
        let journal = MetricLog::open(log_dir, metric.name())?;
        let enabled = AtomicBool::new(metric.enabled_by_default());

        Ok(Self {
            metric,
            enabled,
            journal,
        })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.metric.name()
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.metric.category()
    }

    #[must_use]
    pub fn metric(&self) -> &dyn Metric {
        self.metric.as_ref()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.journal.path()
    }

    /// Collect with the error detail sent to the tracing log; failures and
    /// timeouts come back as `None`.
    pub async fn collect(
        &self,
        source: &dyn QuerySource,
        params: &CollectParams,
    ) -> Option<Payload> {
        match self.try_collect(source, params).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(metric = self.name(), error = %e, "Metric collection failed");
                None
            }
        }
    }

    async fn try_collect(
        &self,
        source: &dyn QuerySource,
        params: &CollectParams,
    ) -> Result<Option<Payload>, CollectionError> {
        tokio::time::timeout(params.timeout, self.metric.collect(source, params))
            .await
            .map_err(|_| CollectionError::Timeout(params.timeout))?
    }

    /// Append the payload to this metric's JSONL log. `Ok(false)` when the
    /// payload is empty and nothing was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the log write fails.
    pub fn log(&self, payload: &Payload, sample_id: &str) -> Result<bool> {
        self.journal.append(payload, sample_id)
    }

    /// # Errors
    ///
    /// Returns an error if the history write fails.
    pub async fn persist(
        &self,
        store: &HistoryStore,
        payload: &Payload,
        sample_id: &str,
    ) -> Result<usize> {
        self.metric.persist(store, payload, sample_id).await
    }

    /// Create the metric's history table and indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn init_storage(&self, store: &HistoryStore) -> Result<()> {
        let Some(schema) = self.metric.storage_schema() else {
            return Ok(());
        };

        store
            .execute_ddl(&schema)
            .await
            .with_context(|| format!("creating history table for {}", self.name()))?;

        for index in self.metric.storage_indexes() {
            store
                .execute_ddl(&index)
                .await
                .with_context(|| format!("creating history index for {}", self.name()))?;
        }

        Ok(())
    }

    #[must_use]
    pub fn summarize(&self, payload: &Payload) -> Option<Summary> {
        self.metric.summarize(payload)
    }
}

/// Result of one collection pass, in collection order.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    taken_at: String,
    payloads: Vec<(&'static str, Payload)>,
}

impl Sample {
    #[must_use]
    pub fn new() -> Self {
        Self {
            taken_at: now_iso(),
            payloads: Vec::new(),
        }
    }

    /// Add or replace the payload for `name`.
    pub fn insert(&mut self, name: &'static str, payload: Payload) {
        if let Some(slot) = self.payloads.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = payload;
        } else {
            self.payloads.push((name, payload));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Payload> {
        self.payloads
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, payload)| payload)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &Payload)> {
        self.payloads.iter().map(|(name, payload)| (*name, payload))
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.payloads.iter().map(|(name, _)| *name).collect()
    }

    #[must_use]
    pub fn taken_at(&self) -> &str {
        &self.taken_at
    }
}

/// Outcome of `log_all` / `persist_all`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub sample_id: String,
    /// Metrics handled successfully.
    pub written: usize,
    /// Unknown metric names and empty payloads.
    pub skipped: usize,
    /// Metrics whose write failed.
    pub failed: usize,
    /// Lines (log) or rows (history) written.
    pub records: usize,
}

pub struct MetricRegistry {
    log_dir: PathBuf,
    entries: Vec<Arc<MetricHandle>>,
    by_name: HashMap<&'static str, Arc<MetricHandle>>,
    by_category: BTreeMap<Category, Vec<&'static str>>,
    stats: SampleStats,
}

impl MetricRegistry {
    /// Empty registry writing metric logs under `log_dir` (created if absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the log directory cannot be created.
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("creating log directory {}", log_dir.display()))?;

        Ok(Self {
            log_dir,
            entries: Vec::new(),
            by_name: HashMap::new(),
            by_category: BTreeMap::new(),
            stats: SampleStats::new(),
        })
    }

    /// Registry holding every built-in metric, enabled per `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric cannot be set up; a partial registry
    /// is never returned.
    pub fn discover(log_dir: impl Into<PathBuf>, config: &MetricConfig) -> Result<Self> {
        let mut registry = Self::new(log_dir)?;

        for (name, factory) in all_factories() {
            let handle = registry.register(factory())?;
            handle.set_enabled(config.is_enabled(name));
        }

        info!(
            metrics = registry.len(),
            enabled = registry.list_enabled().len(),
            "Metrics registered"
        );

        Ok(registry)
    }

    /// Register `metric`. A metric with an already registered name replaces
    /// the earlier one in place: same position, one entry per index, and the
    /// enabled flag of the earlier handle carries over.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric's log file cannot be opened.
    pub fn register(&mut self, metric: Box<dyn Metric>) -> Result<Arc<MetricHandle>> {
        let handle = Arc::new(MetricHandle::new(metric, &self.log_dir)?);
        let name = handle.name();
        let category = handle.category();

        if let Some(previous) = self.by_name.insert(name, Arc::clone(&handle)) {
            debug!(metric = name, "Replacing registered metric");
            handle.set_enabled(previous.is_enabled());

            if let Some(slot) = self.entries.iter_mut().find(|h| h.name() == name) {
                *slot = Arc::clone(&handle);
            }

            let old_category = previous.category();
            if old_category != category {
                if let Some(bucket) = self.by_category.get_mut(&old_category) {
                    bucket.retain(|n| *n != name);
                    if bucket.is_empty() {
                        self.by_category.remove(&old_category);
                    }
                }
                self.by_category.entry(category).or_default().push(name);
            }
        } else {
            self.entries.push(Arc::clone(&handle));
            self.by_category.entry(category).or_default().push(name);
        }

        Ok(handle)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<MetricHandle>> {
        self.by_name.get(name).cloned()
    }

    /// Every registered metric in registration order.
    #[must_use]
    pub fn list_all(&self) -> &[Arc<MetricHandle>] {
        &self.entries
    }

    /// Metrics of one category; empty when nothing uses it.
    #[must_use]
    pub fn list_by_category(&self, category: Category) -> Vec<Arc<MetricHandle>> {
        self.by_category
            .get(&category)
            .map(|names| names.iter().filter_map(|n| self.lookup(n)).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn list_enabled(&self) -> Vec<Arc<MetricHandle>> {
        self.entries
            .iter()
            .filter(|h| h.is_enabled())
            .cloned()
            .collect()
    }

    /// Categories with at least one metric.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        self.by_category.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    #[must_use]
    pub const fn stats(&self) -> &SampleStats {
        &self.stats
    }

    /// Create the history table of every metric.
    ///
    /// # Errors
    ///
    /// Returns an error on the first DDL failure.
    pub async fn init_storage(&self, store: &HistoryStore) -> Result<()> {
        for handle in &self.entries {
            handle.init_storage(store).await?;
        }
        Ok(())
    }

    /// Collect every enabled metric, one at a time in registration order.
    #[instrument(skip(self, source, params), fields(enabled = tracing::field::Empty))]
    pub async fn collect_all(&self, source: &dyn QuerySource, params: &CollectParams) -> Sample {
        let enabled = self.list_enabled();
        tracing::Span::current().record("enabled", enabled.len());

        let mut sample = Sample::new();

        for handle in enabled {
            let name = handle.name();
            let timer = self.stats.start_collect(name);

            let outcome = AssertUnwindSafe(handle.try_collect(source, params))
                .catch_unwind()
                .await;

            match outcome {
                Err(panic) => {
                    timer.error();
                    error!(
                        metric = name,
                        panic = %panic_message(panic.as_ref()),
                        "Metric panicked during collection"
                    );
                }
                Ok(Err(e)) => {
                    timer.error();
                    warn!(metric = name, error = %e, "Metric collection failed");
                }
                Ok(Ok(None)) => {
                    timer.success();
                    debug!(metric = name, "Metric returned no data");
                }
                Ok(Ok(Some(payload))) => {
                    let declared = handle.metric().shape();
                    if payload.shape() != declared {
                        timer.error();
                        error!(
                            metric = name,
                            declared = ?declared,
                            returned = ?payload.shape(),
                            "Metric returned a payload of the wrong shape"
                        );
                    } else if payload.is_empty() {
                        timer.success();
                        debug!(metric = name, "Metric returned an empty payload");
                    } else {
                        timer.success();
                        sample.insert(name, payload);
                    }
                }
            }
        }

        self.stats.finish_sample(sample.len());

        sample
    }

    /// Append every payload of `sample` to its metric's log.
    #[must_use]
    pub fn log_all(&self, sample: &Sample, sample_id: Option<&str>) -> FanoutReport {
        let mut report = FanoutReport {
            sample_id: resolve_sample_id(sample_id),
            ..FanoutReport::default()
        };

        for (name, payload) in sample.entries() {
            let Some(handle) = self.lookup(name) else {
                debug!(metric = name, "Skipping log for unregistered metric");
                report.skipped += 1;
                continue;
            };

            match handle.log(payload, &report.sample_id) {
                Ok(true) => {
                    report.written += 1;
                    report.records += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    self.stats.record_store_error(name);
                    error!(metric = name, error = %e, "Failed to write metric log");
                }
            }
        }

        report
    }

    /// Store every payload of `sample` in its metric's history table.
    pub async fn persist_all(
        &self,
        store: &HistoryStore,
        sample: &Sample,
        sample_id: Option<&str>,
    ) -> FanoutReport {
        let mut report = FanoutReport {
            sample_id: resolve_sample_id(sample_id),
            ..FanoutReport::default()
        };

        for (name, payload) in sample.entries() {
            let Some(handle) = self.lookup(name) else {
                debug!(metric = name, "Skipping persist for unregistered metric");
                report.skipped += 1;
                continue;
            };

            if payload.is_empty() {
                report.skipped += 1;
                continue;
            }

            match handle.persist(store, payload, &report.sample_id).await {
                Ok(rows) => {
                    report.written += 1;
                    report.records += rows;
                }
                Err(e) => {
                    report.failed += 1;
                    self.stats.record_store_error(name);
                    error!(metric = name, error = %e, "Failed to persist metric");
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
