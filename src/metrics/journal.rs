//! Per-metric append-only JSONL log.
//!
//! Every metric owns one file, `<log_dir>/<name>.jsonl`, holding one line per
//! sample with the envelope `{"timestamp", "metric", "sample_id", "data"}`.

use crate::metrics::payload::Payload;
use crate::metrics::util::now_iso;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Serialize)]
struct Envelope<'a> {
    timestamp: String,
    metric: &'a str,
    sample_id: &'a str,
    data: &'a Payload,
}

#[derive(Debug)]
pub struct MetricLog {
    metric: &'static str,
    path: PathBuf,
    file: Mutex<File>,
}

impl MetricLog {
    /// Open (creating if needed) the log file for `metric` inside `log_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn open(log_dir: &Path, metric: &'static str) -> Result<Self> {
        let path = log_dir.join(format!("{metric}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening metric log {}", path.display()))?;

        Ok(Self {
            metric,
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line for `payload`. Returns `false` (nothing written) for
    /// empty payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn append(&self, payload: &Payload, sample_id: &str) -> Result<bool> {
        if payload.is_empty() {
            return Ok(false);
        }

        let mut line = serde_json::to_string(&Envelope {
            timestamp: now_iso(),
            metric: self.metric,
            sample_id,
            data: payload,
        })?;
        line.push('\n');

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(metric = self.metric, "Metric log lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        file.write_all(line.as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))?;

        Ok(true)
    }
}
