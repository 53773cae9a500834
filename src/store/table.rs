//! Declarative history table layout.
//!
//! Each metric declares one flat table. The common bookkeeping columns
//! (`id`, `sample_id`, `timestamp`) are added here, so a metric only lists the
//! fields its records carry.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    #[must_use]
    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }

    #[must_use]
    pub const fn real(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Real,
        }
    }

    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Columns that get a secondary index besides `sample_id`/`timestamp`.
    pub indexed: &'static [&'static str],
}

impl Table {
    #[must_use]
    pub fn create_sql(&self) -> String {
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    id INTEGER PRIMARY KEY AUTOINCREMENT,\n    sample_id TEXT,\n    timestamp TEXT NOT NULL",
            self.name
        );
        for column in self.columns {
            ddl.push_str(",\n    ");
            ddl.push_str(column.name);
            ddl.push(' ');
            ddl.push_str(column.kind.sql_type());
        }
        ddl.push_str("\n)");
        ddl
    }

    /// Index statements: `timestamp` and `sample_id` always, then `indexed`.
    #[must_use]
    pub fn index_sql(&self) -> Vec<String> {
        ["timestamp", "sample_id"]
            .iter()
            .chain(self.indexed.iter())
            .map(|column| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                    table = self.name
                )
            })
            .collect()
    }
}
