pub mod metrics;

use crate::store::DEFAULT_HISTORY_DB;
use clap::{Arg, ArgAction, Command};

pub const DEFAULT_LOG_DIR: &str = "logs";

#[must_use]
pub fn new() -> Command {
    let cmd = Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("dsn")
                .long("dsn")
                .help("MariaDB connection string")
                .default_value("mysql://root@localhost:3306/mysql")
                .env("MARIADB_MONITOR_DSN"),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .help("Directory for the per-metric JSONL logs")
                .default_value(DEFAULT_LOG_DIR)
                .env("MARIADB_MONITOR_LOG_DIR"),
        )
        .arg(
            Arg::new("history-db")
                .long("history-db")
                .help("SQLite history database file")
                .default_value(DEFAULT_HISTORY_DB)
                .env("MARIADB_MONITOR_HISTORY_DB"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .help("Seconds between samples")
                .default_value("60")
                .env("MARIADB_MONITOR_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("iterations")
                .long("iterations")
                .help("Number of samples to take, 0 runs until interrupted")
                .default_value("0")
                .env("MARIADB_MONITOR_ITERATIONS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .help("Maximum rows returned by list metrics")
                .default_value("20")
                .env("MARIADB_MONITOR_LIMIT")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("query-timeout")
                .long("query-timeout")
                .help("Seconds a single metric may spend collecting")
                .default_value("30")
                .env("MARIADB_MONITOR_QUERY_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("exclude-schemas")
                .long("exclude-schemas")
                .help("Schemas ignored by storage metrics (comma separated)")
                .env("MARIADB_MONITOR_EXCLUDE_SCHEMAS")
                .value_delimiter(',')
                .num_args(1..)
                .default_value("information_schema,performance_schema,mysql,sys"),
        )
        .arg(
            Arg::new("alert.max-sessions")
                .long("alert.max-sessions")
                .help("Warn when total sessions reach this count")
                .default_value("500")
                .env("MARIADB_MONITOR_ALERT_MAX_SESSIONS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("alert.max-active-sessions")
                .long("alert.max-active-sessions")
                .help("Warn when active sessions reach this count")
                .default_value("200")
                .env("MARIADB_MONITOR_ALERT_MAX_ACTIVE_SESSIONS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("alert.max-blocked-sessions")
                .long("alert.max-blocked-sessions")
                .help("Raise a critical alert when blocked sessions reach this count")
                .default_value("10")
                .env("MARIADB_MONITOR_ALERT_MAX_BLOCKED_SESSIONS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("alert.max-tablespace-pct")
                .long("alert.max-tablespace-pct")
                .help("Warn when a schema uses this percentage of its allocated space")
                .default_value("90")
                .env("MARIADB_MONITOR_ALERT_MAX_TABLESPACE_PCT")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: -v debug, -vv trace")
                .action(ArgAction::Count),
        );

    metrics::add_metrics_args(cmd)
}
