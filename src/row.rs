//! Raw rows and the mapping from rows to caller records.

use crate::value::SqlValue;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// One fetched row: ordered column values plus the shared column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a column value by position.
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get a column value by name. The first matching column wins.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    /// Convert the row to a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect()
    }

    /// Convert the row to a name → value map.
    pub fn to_map(&self) -> HashMap<String, SqlValue> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Turns one raw row into a caller-defined record.
///
/// Called exactly once per fetched row, in cursor order. A mapper error
/// fails the whole session and reaches the caller as the mapper's own value.
///
/// Any `Fn(Row) -> Result<R, E>` closure is a mapper.
pub trait RecordMapper {
    type Record;
    type Error;

    fn map(&self, row: Row) -> Result<Self::Record, Self::Error>;
}

impl<F, R, E> RecordMapper for F
where
    F: Fn(Row) -> Result<R, E>,
{
    type Record = R;
    type Error = E;

    fn map(&self, row: Row) -> Result<R, E> {
        self(row)
    }
}

/// Identity mapper: records are the raw rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMapper;

impl RecordMapper for RowMapper {
    type Record = Row;
    type Error = std::convert::Infallible;

    fn map(&self, row: Row) -> Result<Row, Self::Error> {
        Ok(row)
    }
}

/// Deserializes each row, viewed as a JSON object, into `T`.
///
/// ```
/// use pgcursors::{JsonMapper, RecordMapper, Row, SqlValue};
///
/// #[derive(serde::Deserialize)]
/// struct Model { id: i64, name: String }
///
/// let row = Row::new(
///     vec!["id".to_string(), "name".to_string()].into(),
///     vec![SqlValue::Int(1), SqlValue::from("Foo")],
/// );
/// let model: Model = JsonMapper::new().map(row).unwrap();
/// assert_eq!((model.id, model.name.as_str()), (1, "Foo"));
/// ```
pub struct JsonMapper<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonMapper<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonMapper<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> RecordMapper for JsonMapper<T> {
    type Record = T;
    type Error = serde_json::Error;

    fn map(&self, row: Row) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(row.to_json()))
    }
}
