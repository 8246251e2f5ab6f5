//! Row-oriented result records.
//!
//! BigQuery returns a schema plus rows of positional cells. `reshape` zips the
//! two into `Record`s keyed by field name.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::bigquery::{TableRow, TableSchema};
use crate::error::{Result, StatsError};

/// One result row as ordered `(field name, cell value)` pairs.
///
/// Fields keep schema order. Cell values are passed through exactly as the
/// service returned them (BigQuery encodes scalars as JSON strings, nested
/// and repeated fields as objects and arrays).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Returns the value of the named field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Returns the named field as a string slice, if it is a JSON string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Field names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Converts schema + rows into records, preserving row order.
///
/// A row whose cell count differs from the schema's field count is a malformed
/// response.
pub fn reshape(schema: &TableSchema, rows: Vec<TableRow>) -> Result<Vec<Record>> {
    let width = schema.fields.len();

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.cells.len() != width {
                return Err(StatsError::malformed(format!(
                    "Row {} has {} cells but the schema has {} fields",
                    index,
                    row.cells.len(),
                    width
                )));
            }

            let fields = schema
                .fields
                .iter()
                .zip(row.cells)
                .map(|(field, cell)| (field.name.clone(), cell.value))
                .collect();
            Ok(Record::new(fields))
        })
        .collect()
}
