use crate::{
    alerts::Thresholds,
    cli::actions::Action,
    metrics::{CollectParams, METRIC_NAMES, all_factories},
};
use anyhow::{Result, anyhow};
use clap::ArgMatches;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// # Errors
///
/// Returns an error if required arguments are missing
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let dsn = SecretString::from(
        matches
            .get_one::<String>("dsn")
            .cloned()
            .ok_or_else(|| anyhow!("DSN is required. Please provide it using the --dsn flag."))?,
    );

    let path = |id: &str| -> Result<PathBuf> {
        matches
            .get_one::<String>(id)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("--{id} is required"))
    };

    let seconds = |id: &str| -> Result<Duration> {
        matches
            .get_one::<u64>(id)
            .copied()
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("--{id} is required"))
    };

    let iterations = matches
        .get_one::<u64>("iterations")
        .copied()
        .filter(|n| *n > 0);

    let params = collect_params(matches, seconds("query-timeout")?)?;
    info!("Excluded schemas: {:?}", params.excluded_schemas);

    Ok(Action::Run {
        dsn,
        log_dir: path("log-dir")?,
        history_db: path("history-db")?,
        interval: seconds("interval")?,
        iterations,
        params,
        thresholds: thresholds(matches),
        metrics: get_enabled_metrics(matches),
    })
}

fn collect_params(matches: &ArgMatches, timeout: Duration) -> Result<CollectParams> {
    let limit = matches
        .get_one::<u32>("limit")
        .copied()
        .ok_or_else(|| anyhow!("--limit is required"))?;

    let excludes: Vec<String> = matches
        .get_many::<String>("exclude-schemas")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    Ok(CollectParams::default()
        .with_limit(limit)
        .with_timeout(timeout)
        .with_excluded_schemas(excludes))
}

fn thresholds(matches: &ArgMatches) -> Thresholds {
    let defaults = Thresholds::default();
    let count = |id: &str, default: i64| matches.get_one::<i64>(id).copied().unwrap_or(default);

    Thresholds {
        max_sessions: count("alert.max-sessions", defaults.max_sessions),
        max_active_sessions: count("alert.max-active-sessions", defaults.max_active_sessions),
        max_blocked_sessions: count("alert.max-blocked-sessions", defaults.max_blocked_sessions),
        max_tablespace_pct: matches
            .get_one::<f64>("alert.max-tablespace-pct")
            .copied()
            .unwrap_or(defaults.max_tablespace_pct),
    }
}

#[must_use]
pub fn get_enabled_metrics(matches: &ArgMatches) -> Vec<String> {
    let factories = all_factories();

    METRIC_NAMES
        .iter()
        .filter(|&name| {
            let enable_flag = format!("metric.{name}");
            let disable_flag = format!("no-metric.{name}");

            // If explicitly disabled, skip it
            if matches.get_flag(&disable_flag) {
                return false;
            }

            // If explicitly enabled, include it
            if matches.get_flag(&enable_flag) {
                return true;
            }

            factories
                .iter()
                .find(|(factory_name, _)| factory_name == name)
                .is_some_and(|(_, factory)| factory().enabled_by_default())
        })
        .map(|&name| name.to_string())
        .collect()
}
