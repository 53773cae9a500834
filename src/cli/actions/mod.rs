pub mod run;

use crate::alerts::Thresholds;
use crate::metrics::CollectParams;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
pub enum Action {
    Run {
        dsn: SecretString,
        log_dir: PathBuf,
        history_db: PathBuf,
        interval: Duration,
        iterations: Option<u64>,
        params: CollectParams,
        thresholds: Thresholds,
        metrics: Vec<String>,
    },
}
