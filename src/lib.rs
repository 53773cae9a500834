//! Read-only `MariaDB` monitor.
//!
//! Independent metric plugins are discovered into a [`metrics::MetricRegistry`],
//! sampled on a fixed interval, written to per-metric JSONL logs and persisted
//! into a local `SQLite` history store.

pub mod alerts;
pub mod cli;
pub mod metrics;
pub mod monitor;
pub mod store;
