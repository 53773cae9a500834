use anyhow::Result;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

/// Self-monitoring of the sampling pipeline, kept in a private registry so a
/// host UI can render or export it.
#[derive(Clone)]
pub struct SampleStats {
    registry: Registry,
    collect_duration_seconds: HistogramVec,
    collect_errors_total: CounterVec,
    last_collect_success: GaugeVec,
    store_errors_total: CounterVec,
    samples_total: IntCounter,
    payloads_last_sample: IntGauge,
}

impl Default for SampleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStats {
    #[must_use]
    #[allow(clippy::expect_used)]
    ///
    /// # Panics
    ///
    /// Panics if metric creation or registration fails.
    pub fn new() -> Self {
        let collect_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mariadb_monitor_collect_duration_seconds",
                "Time spent collecting each metric in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 30.0]),
            &["metric"],
        )
        .expect("mariadb_monitor_collect_duration_seconds");

        let collect_errors_total = CounterVec::new(
            Opts::new(
                "mariadb_monitor_collect_errors_total",
                "Total number of failed collections per metric",
            ),
            &["metric"],
        )
        .expect("mariadb_monitor_collect_errors_total");

        let last_collect_success = GaugeVec::new(
            Opts::new(
                "mariadb_monitor_last_collect_success",
                "Whether the last collection was successful (1=success, 0=failure)",
            ),
            &["metric"],
        )
        .expect("mariadb_monitor_last_collect_success");

        let store_errors_total = CounterVec::new(
            Opts::new(
                "mariadb_monitor_store_errors_total",
                "Total number of failed log or history writes per metric",
            ),
            &["metric"],
        )
        .expect("mariadb_monitor_store_errors_total");

        let samples_total = IntCounter::with_opts(Opts::new(
            "mariadb_monitor_samples_total",
            "Total number of sampling passes since start",
        ))
        .expect("mariadb_monitor_samples_total");

        let payloads_last_sample = IntGauge::with_opts(Opts::new(
            "mariadb_monitor_payloads_last_sample",
            "Number of payloads produced by the last sampling pass",
        ))
        .expect("mariadb_monitor_payloads_last_sample");

        let stats = Self {
            registry: Registry::new(),
            collect_duration_seconds,
            collect_errors_total,
            last_collect_success,
            store_errors_total,
            samples_total,
            payloads_last_sample,
        };

        stats
            .register()
            .expect("self-monitoring metrics register once into a fresh registry");

        stats
    }

    fn register(&self) -> Result<()> {
        self.registry
            .register(Box::new(self.collect_duration_seconds.clone()))?;
        self.registry
            .register(Box::new(self.collect_errors_total.clone()))?;
        self.registry
            .register(Box::new(self.last_collect_success.clone()))?;
        self.registry
            .register(Box::new(self.store_errors_total.clone()))?;
        self.registry.register(Box::new(self.samples_total.clone()))?;
        self.registry
            .register(Box::new(self.payloads_last_sample.clone()))?;
        Ok(())
    }

    #[must_use]
    pub fn start_collect(&self, metric: &str) -> CollectTimer {
        CollectTimer {
            metric: metric.to_string(),
            start: Instant::now(),
            stats: self.clone(),
            finished: false,
        }
    }

    pub fn record_store_error(&self, metric: &str) {
        self.store_errors_total.with_label_values(&[metric]).inc();
    }

    pub fn finish_sample(&self, payloads: usize) {
        self.samples_total.inc();
        self.payloads_last_sample
            .set(i64::try_from(payloads).unwrap_or(i64::MAX));
    }

    #[must_use]
    pub fn collect_errors(&self, metric: &str) -> f64 {
        self.collect_errors_total.with_label_values(&[metric]).get()
    }

    #[must_use]
    pub fn store_errors(&self, metric: &str) -> f64 {
        self.store_errors_total.with_label_values(&[metric]).get()
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples_total.get()
    }

    #[must_use]
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition of every self-monitoring metric.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn record_success(&self, metric: &str, duration: f64) {
        self.collect_duration_seconds
            .with_label_values(&[metric])
            .observe(duration);

        self.last_collect_success
            .with_label_values(&[metric])
            .set(1.0);
    }

    fn record_error(&self, metric: &str, duration: f64) {
        self.collect_duration_seconds
            .with_label_values(&[metric])
            .observe(duration);

        self.collect_errors_total.with_label_values(&[metric]).inc();

        self.last_collect_success
            .with_label_values(&[metric])
            .set(0.0);
    }
}

/// Times one metric collection. Dropping an unfinished timer counts as a
/// success, so only failures need an explicit call.
pub struct CollectTimer {
    metric: String,
    start: Instant,
    stats: SampleStats,
    finished: bool,
}

impl CollectTimer {
    pub fn success(mut self) {
        self.finish(true);
    }

    pub fn error(mut self) {
        self.finish(false);
    }

    fn finish(&mut self, ok: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let duration = self.start.elapsed().as_secs_f64();
        if ok {
            self.stats.record_success(&self.metric, duration);
        } else {
            self.stats.record_error(&self.metric, duration);
        }
    }
}

impl Drop for CollectTimer {
    fn drop(&mut self) {
        self.finish(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn sample_count(stats: &SampleStats, metric: &str) -> u64 {
        stats
            .collect_duration_seconds
            .with_label_values(&[metric])
            .get_sample_count()
    }

    #[test]
    fn test_sample_stats_new() {
        let stats = SampleStats::new();
        assert_eq!(stats.samples(), 0);
        assert_eq!(stats.payloads_last_sample.get(), 0);
    }

    #[test]
    fn test_collect_timer_records_duration_once() {
        let stats = SampleStats::new();

        {
            let timer = stats.start_collect("top_sessions");
            thread::sleep(Duration::from_millis(5));
            timer.success();
        }

        assert_eq!(sample_count(&stats, "top_sessions"), 1);
        assert!((stats.collect_errors("top_sessions")).abs() < f64::EPSILON);
    }

    #[test]
    fn test_collect_timer_records_error() {
        let stats = SampleStats::new();

        stats.start_collect("wait_events").error();

        assert!((stats.collect_errors("wait_events") - 1.0).abs() < f64::EPSILON);
        let success = stats
            .last_collect_success
            .with_label_values(&["wait_events"])
            .get();
        assert!(success.abs() < f64::EPSILON);
    }

    #[test]
    fn test_dropped_timer_counts_as_success() {
        let stats = SampleStats::new();

        drop(stats.start_collect("redo_metrics"));

        let success = stats
            .last_collect_success
            .with_label_values(&["redo_metrics"])
            .get();
        assert!((success - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finish_sample_and_store_errors() {
        let stats = SampleStats::new();
        stats.finish_sample(7);
        stats.finish_sample(3);
        stats.record_store_error("plan_churn");

        assert_eq!(stats.samples(), 2);
        assert_eq!(stats.payloads_last_sample.get(), 3);
        assert!((stats.store_errors("plan_churn") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_encode_text_exposes_metric_names() -> Result<()> {
        let stats = SampleStats::new();
        stats.start_collect("host_metrics").success();
        stats.finish_sample(1);

        let text = stats.encode_text()?;
        assert!(text.contains("mariadb_monitor_samples_total 1"));
        assert!(text.contains("mariadb_monitor_collect_duration_seconds_bucket"));
        assert!(text.contains("metric=\"host_metrics\""));
        Ok(())
    }
}
