//! Materialized row records.

use crate::value::Value;
use indexmap::IndexMap;
use indexmap::map::{IntoIter, Iter};
use serde::{Deserialize, Serialize};

/// One converted cell of a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// The column appears in the record with this text.
    Present(String),
    /// The column is left out of the record entirely.
    Omitted,
}

impl Cell {
    /// Convert a scanned value into its record form.
    ///
    /// Binary data becomes its lossy UTF-8 text and NULL becomes the empty
    /// string, or [`Cell::Omitted`] when `delete_null_values` is set. Every
    /// other value uses its display form.
    pub fn from_value(value: Value, delete_null_values: bool) -> Self {
        match value {
            Value::Null if delete_null_values => Cell::Omitted,
            Value::Null => Cell::Present(String::new()),
            Value::Text(s) => Cell::Present(s),
            Value::Bytes(b) => Cell::Present(match String::from_utf8(b) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            }),
            other => Cell::Present(other.to_string()),
        }
    }
}

/// An ordered mapping from column name to stringified cell value.
///
/// Keys keep the cursor's declared column order. A record built with null
/// omission enabled may lack some of the query's columns, so two records
/// from the same query can have different key sets.
///
/// Equality compares contents regardless of order; use [`RowRecord::keys`]
/// to check ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowRecord {
    fields: IndexMap<String, String>,
}

impl RowRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// Append a converted cell. Omitted cells leave the record unchanged.
    pub fn push(&mut self, column: impl Into<String>, cell: Cell) {
        if let Cell::Present(text) = cell {
            self.fields.insert(column.into(), text);
        }
    }

    /// Insert a column directly.
    pub fn insert(&mut self, column: impl Into<String>, text: impl Into<String>) -> Option<String> {
        self.fields.insert(column.into(), text.into())
    }

    /// Get a value by column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Check if a column is present.
    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Number of columns present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterate over (column, value) pairs in order.
    pub fn iter(&self) -> Iter<'_, String, String> {
        self.fields.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RowRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for RowRecord {
    type Item = (String, String);
    type IntoIter = IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowRecord {
    type Item = (&'a String, &'a String);
    type IntoIter = Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
