use crate::metrics::payload::{Record, record, round2};
use crate::metrics::{
    Category, CollectParams, CollectionError, Metric, Payload, PayloadShape, QuerySource, Summary,
};
use crate::store::{Column, Table};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::{Pid, System};
use tracing::{instrument, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

static TABLE: Table = Table {
    name: "host_metrics_history",
    columns: &[
        Column::real("cpu_percent"),
        Column::integer("cpu_count"),
        Column::real("memory_percent"),
        Column::real("memory_used_gb"),
        Column::real("memory_total_gb"),
        Column::real("swap_percent"),
        Column::real("load_avg_1"),
        Column::real("load_avg_5"),
        Column::real("load_avg_15"),
        Column::real("process_memory_mb"),
        Column::real("process_cpu_percent"),
    ],
    indexed: &[],
};

struct SystemState {
    system: System,
    last_refresh: Option<Instant>,
}

/// Host CPU, memory, swap and load plus this process' own footprint.
///
/// Reads the local machine through `sysinfo`; the query source is not used.
/// The first sample after start reports 0% CPU because usage is a delta
/// between two refreshes.
pub struct HostMetrics {
    state: Mutex<Option<SystemState>>,
    pid: Pid,
}

impl Default for HostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            pid: Pid::from(std::process::id() as usize),
        }
    }

    fn snapshot(&self) -> Result<Record, CollectionError> {
        let now = Instant::now();

        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("System mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let state = guard.get_or_insert_with(|| SystemState {
            system: System::new_all(),
            last_refresh: Some(now),
        });

        let should_wait = state
            .last_refresh
            .is_some_and(|last| now.duration_since(last) < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        if !should_wait {
            state.system.refresh_all();
            state.last_refresh = Some(now);
        }

        let system = &state.system;
        if system.cpus().is_empty() {
            return Err(CollectionError::Host("no CPUs reported".to_string()));
        }

        Ok(host_record(system, system.process(self.pid)))
    }
}

#[allow(clippy::cast_precision_loss)]
fn host_record(system: &System, process: Option<&sysinfo::Process>) -> Record {
    let total_memory = system.total_memory() as f64;
    let used_memory = system.used_memory() as f64;
    let total_swap = system.total_swap() as f64;
    let used_swap = system.used_swap() as f64;
    let load = System::load_average();

    record([
        (
            "cpu_percent",
            json!(round2(f64::from(system.global_cpu_usage()))),
        ),
        ("cpu_count", json!(system.cpus().len())),
        ("memory_percent", json!(round2(percent(used_memory, total_memory)))),
        ("memory_used_gb", json!(round2(used_memory / BYTES_PER_GB))),
        ("memory_total_gb", json!(round2(total_memory / BYTES_PER_GB))),
        ("swap_percent", json!(round2(percent(used_swap, total_swap)))),
        ("load_avg_1", json!(round2(load.one))),
        ("load_avg_5", json!(round2(load.five))),
        ("load_avg_15", json!(round2(load.fifteen))),
        (
            "process_memory_mb",
            json!(round2(process.map_or(0.0, |p| p.memory() as f64) / BYTES_PER_MB)),
        ),
        (
            "process_cpu_percent",
            json!(round2(process.map_or(0.0, |p| f64::from(p.cpu_usage())))),
        ),
    ])
}

fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 { used / total * 100.0 } else { 0.0 }
}

impl Metric for HostMetrics {
    fn name(&self) -> &'static str {
        "host_metrics"
    }

    fn display_name(&self) -> &'static str {
        "Host Metrics"
    }

    fn description(&self) -> &'static str {
        "Host CPU, memory, swap and load average"
    }

    fn category(&self) -> Category {
        Category::System
    }

    fn shape(&self) -> PayloadShape {
        PayloadShape::ScalarRecord
    }

    #[instrument(skip(self, _source, _params), level = "info", fields(metric = "host_metrics", otel.kind = "internal"))]
    fn collect<'a>(
        &'a self,
        _source: &'a dyn QuerySource,
        _params: &'a CollectParams,
    ) -> BoxFuture<'a, Result<Option<Payload>, CollectionError>> {
        Box::pin(async move { self.snapshot().map(|fields| Some(Payload::scalar(fields))) })
    }

    fn table(&self) -> Option<&'static Table> {
        Some(&TABLE)
    }

    fn summarize(&self, payload: &Payload) -> Option<Summary> {
        let pct = |field| format!("{:.1}", payload.field_f64(field).unwrap_or(0.0));
        Some(vec![
            ("CPU (%)", pct("cpu_percent")),
            ("Memory (%)", pct("memory_percent")),
            ("Swap (%)", pct("swap_percent")),
            ("Load (1m)", format!("{:.2}", payload.field_f64("load_avg_1").unwrap_or(0.0))),
        ])
    }
}
