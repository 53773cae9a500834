use crate::cli::actions::Action;
use crate::metrics::MetricConfig;
use crate::monitor::{MonitorOptions, new};
use anyhow::Result;

/// Handle the run action
///
/// # Errors
///
/// Returns an error if the monitor fails to start
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run {
            dsn,
            log_dir,
            history_db,
            interval,
            iterations,
            params,
            thresholds,
            metrics,
        } => {
            new(MonitorOptions {
                dsn,
                log_dir,
                history_db,
                interval,
                iterations,
                params,
                thresholds,
                metrics: MetricConfig::new().with_enabled(&metrics),
            })
            .await?;
        }
    }

    Ok(())
}
