use std::collections::HashSet;

#[derive(Clone, Debug, Default)]
pub struct MetricConfig {
    pub enabled_metrics: HashSet<String>,
}

impl MetricConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_enabled(mut self, metrics: &[String]) -> Self {
        self.enabled_metrics = metrics.iter().cloned().collect();
        self
    }

    /// Every built-in metric whose default is "enabled".
    #[must_use]
    pub fn defaults() -> Self {
        let enabled: Vec<String> = crate::metrics::all_factories()
            .into_iter()
            .filter(|(_, factory)| factory().enabled_by_default())
            .map(|(name, _)| name.to_string())
            .collect();

        Self::new().with_enabled(&enabled)
    }

    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_metrics.contains(name)
    }
}
