//! Result rows handed back by a driver.

use crate::value::Value;
use std::sync::Arc;

/// One result row.
///
/// Column names are shared between the rows of one result set. sqltrail
/// returns rows to the caller exactly as the driver built them; suppressed
/// statements simply produce no rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(columns.into(), values)
    }

    /// Build a row that shares its column list with sibling rows.
    pub fn with_columns(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len(), "row width mismatch");
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
