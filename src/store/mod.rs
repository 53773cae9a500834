//! Local history of collected samples, kept in an embedded `SQLite` file.

pub mod table;

pub use table::{Column, ColumnKind, Table};

use crate::metrics::payload::Record;
use crate::metrics::source::{value_as_f64, value_as_i64};
use crate::metrics::util::now_iso;
use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, SqlitePool};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Default location of the history database.
pub const DEFAULT_HISTORY_DB: &str = "logs/monitor_history.db";

#[derive(Clone, Debug)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (or create) the history database at `path` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the database cannot be
    /// created.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("opening history store {}", path.display()))?;

        info!(path = %path.display(), "History store ready");

        Ok(Self { pool })
    }

    /// Private in-memory database; a single connection that never recycles,
    /// otherwise every new connection would see an empty database.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot be initialised.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self { pool })
    }

    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn execute_ddl(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert one row per record, all stamped with the same `sample_id` and
    /// write time. Values are coerced to the declared column type; fields the
    /// table does not declare are ignored and missing ones stored as NULL.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    #[instrument(skip(self, table, records), fields(table = table.name, rows = records.len()), err)]
    pub async fn insert(&self, table: &Table, records: &[Record], sample_id: &str) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = insert_sql(table);
        let timestamp = now_iso();

        let mut tx = self.pool.begin().await?;
        for record in records {
            let mut query = sqlx::query(&sql).bind(sample_id).bind(&timestamp);
            for column in table.columns {
                let value = record.get(column.name).filter(|v| !v.is_null());
                query = match column.kind {
                    ColumnKind::Integer => query.bind(value.and_then(value_as_i64)),
                    ColumnKind::Real => query.bind(value.and_then(value_as_f64)),
                    ColumnKind::Text => query.bind(value.map(value_as_text)),
                };
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(rows = records.len(), "Rows stored");

        Ok(records.len())
    }

    /// Latest rows of `table`, newest first, including `sample_id` and
    /// `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn fetch_recent(&self, table: &Table, limit: u32) -> Result<Vec<Record>> {
        let sql = format!("SELECT * FROM {} ORDER BY id DESC LIMIT ?", table.name);
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| decode_row(table, row)).collect()
    }

    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {table}");
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn insert_sql(table: &Table) -> String {
    let mut columns = vec!["sample_id", "timestamp"];
    columns.extend(table.columns.iter().map(|column| column.name));
    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        table.name,
        columns.join(", ")
    )
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode_row(table: &Table, row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    record.insert("id".to_string(), Value::from(row.try_get::<i64, _>("id")?));
    record.insert(
        "sample_id".to_string(),
        row.try_get::<Option<String>, _>("sample_id")?
            .map_or(Value::Null, Value::from),
    );
    record.insert(
        "timestamp".to_string(),
        Value::from(row.try_get::<String, _>("timestamp")?),
    );

    for column in table.columns {
        let value = match column.kind {
            ColumnKind::Integer => row
                .try_get::<Option<i64>, _>(column.name)?
                .map_or(Value::Null, Value::from),
            ColumnKind::Real => row
                .try_get::<Option<f64>, _>(column.name)?
                .map_or(Value::Null, Value::from),
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(column.name)?
                .map_or(Value::Null, Value::from),
        };
        record.insert(column.name.to_string(), value);
    }

    Ok(record)
}
