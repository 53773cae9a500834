//! Shared helpers for metrics and the sampling driver:
//! - `MariaDB` version parsing (from `SELECT VERSION()`).
//! - Sample identifiers and row timestamps.
//! - DSN handling that never leaks the password into logs.

use chrono::Local;
use once_cell::sync::OnceCell;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Format of generated sample identifiers and history timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Current local time as ISO-8601 with microseconds.
#[must_use]
pub fn now_iso() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// The caller's sample id, or a timestamp-derived one when absent or blank.
#[must_use]
pub fn resolve_sample_id(sample_id: Option<&str>) -> String {
    match sample_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => now_iso(),
    }
}

/// Trim, drop blanks and de-duplicate a user supplied list, keeping order.
#[must_use]
pub fn clean_list(list: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(list.len());
    for item in list {
        let item = item.trim();
        if !item.is_empty() && !cleaned.iter().any(|existing| existing == item) {
            cleaned.push(item.to_string());
        }
    }
    cleaned
}

/// Parse and normalize `MariaDB` version string.
/// Returns a tuple of (`normalized_string`, `version_number`).
/// e.g. "10.5.8-MariaDB" -> ("10.5.8", 100508)
///      "11.4" -> ("11.4.0", 110400)
///
/// # Panics
///
/// Panics if the regex cannot be compiled (should never happen).
#[must_use]
pub fn normalize_mariadb_version(version_string: &str) -> (String, i64) {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("Invalid regex")
    });

    if let Some(caps) = re.captures(version_string.trim()) {
        let part = |i| {
            caps.get(i)
                .map_or(0, |m| m.as_str().parse::<i64>().unwrap_or(0))
        };
        let (major, minor, patch) = (part(1), part(2), part(3));

        (
            format!("{major}.{minor}.{patch}"),
            major * 10000 + minor * 100 + patch,
        )
    } else {
        ("0.0.0".to_string(), 0)
    }
}

/// DSN with the password masked, safe to log.
#[must_use]
pub fn redact_dsn(dsn: &SecretString) -> String {
    match Url::parse(dsn.expose_secret()) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<invalid dsn>".to_string(),
    }
}

/// Database name from the DSN path, if any.
#[must_use]
pub fn database_from_dsn(dsn: &SecretString) -> Option<String> {
    Url::parse(dsn.expose_secret()).ok().and_then(|url| {
        let db = url.path().trim_start_matches('/');
        if db.is_empty() {
            None
        } else {
            Some(db.to_string())
        }
    })
}
