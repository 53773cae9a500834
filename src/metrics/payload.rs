//! Typed metric payloads.
//!
//! A metric produces either a list of homogeneous records wrapped under a
//! well-known key, or a single flat record. The shape is declared up front by
//! every metric so callers never have to guess how to unwrap a payload.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// One collected record (column name -> value).
pub type Record = Map<String, Value>;

/// Display-oriented projection of a payload, in presentation order.
pub type Summary = Vec<(&'static str, String)>;

/// Declared payload shape of a metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{ <key>: [records], "count": N }`
    RecordList(&'static str),
    /// A single flat record.
    ScalarRecord,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    RecordList {
        key: &'static str,
        records: Vec<Record>,
    },
    ScalarRecord(Record),
}

impl Payload {
    #[must_use]
    pub const fn list(key: &'static str, records: Vec<Record>) -> Self {
        Self::RecordList { key, records }
    }

    #[must_use]
    pub const fn scalar(fields: Record) -> Self {
        Self::ScalarRecord(fields)
    }

    #[must_use]
    pub const fn shape(&self) -> PayloadShape {
        match self {
            Self::RecordList { key, .. } => PayloadShape::RecordList(*key),
            Self::ScalarRecord(_) => PayloadShape::ScalarRecord,
        }
    }

    /// A scalar payload without fields carries nothing and is never logged
    /// or stored. A list payload always carries at least its `count`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::RecordList { .. } => false,
            Self::ScalarRecord(fields) => fields.is_empty(),
        }
    }

    /// Number of records this payload turns into when persisted.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::RecordList { records, .. } => records.len(),
            Self::ScalarRecord(fields) => usize::from(!fields.is_empty()),
        }
    }

    /// Rows to persist: every list entry, or the scalar record itself.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        match self {
            Self::RecordList { records, .. } => records,
            Self::ScalarRecord(fields) if fields.is_empty() => &[],
            Self::ScalarRecord(fields) => std::slice::from_ref(fields),
        }
    }

    /// Field of a scalar payload.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::ScalarRecord(fields) => fields.get(name),
            Self::RecordList { .. } => None,
        }
    }

    #[must_use]
    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    /// JSON form, identical to what is written to the JSONL log.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::RecordList { key, records } => {
                let mut map = Map::new();
                map.insert(
                    (*key).to_string(),
                    Value::Array(records.iter().cloned().map(Value::Object).collect()),
                );
                map.insert("count".to_string(), Value::from(records.len()));
                Value::Object(map)
            }
            Self::ScalarRecord(fields) => Value::Object(fields.clone()),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::RecordList { key, records } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(key, records)?;
                map.serialize_entry("count", &records.len())?;
                map.end()
            }
            Self::ScalarRecord(fields) => fields.serialize(serializer),
        }
    }
}

/// Build a [`Record`] from `(column, value)` pairs.
pub fn record<I, K>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Round to two decimals, the precision history tables display with.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
