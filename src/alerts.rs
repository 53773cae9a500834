//! Threshold checks over a collected sample.

use crate::metrics::Sample;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    pub max_sessions: i64,
    pub max_active_sessions: i64,
    pub max_blocked_sessions: i64,
    pub max_tablespace_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_sessions: 500,
            max_active_sessions: 200,
            max_blocked_sessions: 10,
            max_tablespace_pct: 90.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("WARNING"),
            Self::Critical => f.write_str("CRITICAL"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: &'static str,
    pub message: String,
}

impl Alert {
    fn new(level: AlertLevel, metric: &'static str, message: String) -> Self {
        Self {
            level,
            metric,
            message,
        }
    }
}

/// Compare a sample against `thresholds`. A reading equal to its threshold
/// alerts; metrics missing from the sample are ignored.
#[must_use]
pub fn evaluate(sample: &Sample, thresholds: &Thresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(overview) = sample.get("session_overview") {
        let total = overview.field_i64("total_sessions").unwrap_or(0);
        if total >= thresholds.max_sessions {
            alerts.push(Alert::new(
                AlertLevel::Warning,
                "session_overview",
                format!(
                    "High session count: {total} (threshold {})",
                    thresholds.max_sessions
                ),
            ));
        }

        let active = overview.field_i64("active_sessions").unwrap_or(0);
        if active >= thresholds.max_active_sessions {
            alerts.push(Alert::new(
                AlertLevel::Warning,
                "session_overview",
                format!(
                    "High active session count: {active} (threshold {})",
                    thresholds.max_active_sessions
                ),
            ));
        }

        let blocked = overview.field_i64("blocked_sessions").unwrap_or(0);
        if blocked >= thresholds.max_blocked_sessions {
            alerts.push(Alert::new(
                AlertLevel::Critical,
                "session_overview",
                format!(
                    "Blocked sessions: {blocked} (threshold {})",
                    thresholds.max_blocked_sessions
                ),
            ));
        }
    }

    if let Some(tablespaces) = sample.get("tablespace_usage") {
        for tablespace in tablespaces.records() {
            let pct = tablespace
                .get("pct_used")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            if pct >= thresholds.max_tablespace_pct {
                let name = tablespace
                    .get("tablespace")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                alerts.push(Alert::new(
                    AlertLevel::Warning,
                    "tablespace_usage",
                    format!("Tablespace {name} is {pct:.1}% full"),
                ));
            }
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Payload;
    use crate::metrics::payload::record;
    use serde_json::json;

    fn overview(total: i64, active: i64, blocked: i64) -> Payload {
        Payload::scalar(record([
            ("total_sessions", json!(total)),
            ("active_sessions", json!(active)),
            ("blocked_sessions", json!(blocked)),
        ]))
    }

    #[test]
    fn test_quiet_sample_has_no_alerts() {
        let mut sample = Sample::new();
        sample.insert("session_overview", overview(12, 3, 0));

        assert!(evaluate(&sample, &Thresholds::default()).is_empty());
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let mut sample = Sample::new();
        sample.insert("session_overview", overview(500, 200, 10));

        let alerts = evaluate(&sample, &Thresholds::default());
        let levels: Vec<AlertLevel> = alerts.iter().map(|a| a.level).collect();

        assert_eq!(
            levels,
            vec![AlertLevel::Warning, AlertLevel::Warning, AlertLevel::Critical]
        );
        assert!(alerts.iter().all(|a| a.metric == "session_overview"));
    }

    #[test]
    fn test_full_tablespaces() {
        let mut sample = Sample::new();
        sample.insert(
            "tablespace_usage",
            Payload::list(
                "tablespaces",
                vec![
                    record([("tablespace", json!("app")), ("pct_used", json!(95.5))]),
                    record([("tablespace", json!("logs")), ("pct_used", json!(40.0))]),
                ],
            ),
        );

        let alerts = evaluate(&sample, &Thresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts.first().map(|a| a.message.as_str()),
            Some("Tablespace app is 95.5% full")
        );
    }

    #[test]
    fn test_missing_metrics_are_ignored() {
        let thresholds = Thresholds {
            max_sessions: 0,
            ..Thresholds::default()
        };
        assert!(evaluate(&Sample::new(), &thresholds).is_empty());
    }

    #[test]
    fn test_level_display() {
        assert_eq!(AlertLevel::Critical.to_string(), "CRITICAL");
        assert!(AlertLevel::Critical > AlertLevel::Warning);
    }
}
