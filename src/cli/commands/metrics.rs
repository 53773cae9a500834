use crate::metrics::all_factories;
use clap::{Arg, ArgAction, Command};

/// Add a `--metric.<name>` / `--no-metric.<name>` pair for every built-in
/// metric. The last flag given wins.
pub fn add_metrics_args(mut cmd: Command) -> Command {
    for (name, factory) in all_factories() {
        let metric = factory();
        let default_enabled = metric.enabled_by_default();

        let enable_flag: &'static str = Box::leak(format!("metric.{name}").into_boxed_str());
        let disable_flag: &'static str = Box::leak(format!("no-metric.{name}").into_boxed_str());

        let default_indicator = if default_enabled {
            " [default: enabled]"
        } else {
            " [default: disabled]"
        };
        let enable_help: &'static str = Box::leak(
            format!(
                "Enable {} ({}){default_indicator}",
                metric.display_name(),
                metric.category()
            )
            .into_boxed_str(),
        );
        let disable_help: &'static str =
            Box::leak(format!("Disable {}", metric.display_name()).into_boxed_str());

        cmd = cmd
            .arg(
                Arg::new(enable_flag)
                    .long(enable_flag)
                    .help(enable_help)
                    .action(ArgAction::SetTrue)
                    .default_value(if default_enabled { "true" } else { "false" }),
            )
            .arg(
                Arg::new(disable_flag)
                    .long(disable_flag)
                    .help(disable_help)
                    .action(ArgAction::SetTrue)
                    .overrides_with(enable_flag),
            );
    }
    cmd
}
