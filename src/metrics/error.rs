//! Error types at the metric/backend seam.
//!
//! Backend failures never escape a metric as panics: they are returned as
//! [`CollectionError`] and the registry turns them into "no data this cycle".

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`crate::metrics::QuerySource`].
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error("{0}")]
    Backend(String),
}

/// Why a metric produced no payload.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("required statistic `{0}` is not available")]
    MissingStatistic(&'static str),

    #[error("host statistics unavailable: {0}")]
    Host(String),

    #[error("collection timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}
