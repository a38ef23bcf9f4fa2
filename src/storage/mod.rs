//! Storage engine adapter: the `records` table, scoped transactions and
//! parameterized statement execution.

pub mod sqlite;

pub use sqlite::{Scope, SqliteStore};

use std::sync::Arc;

use rusqlite::types::Value;

use crate::errors::{IndexError, Result};

/// One result row, addressable by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value of a column.
    pub fn get(&self, column: &str) -> Result<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| IndexError::Storage(format!("no such column in result: {column}")))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        match self.get(column)? {
            Value::Integer(i) => Ok(*i),
            other => Err(mismatch(column, "integer", other)),
        }
    }

    pub fn get_text(&self, column: &str) -> Result<String> {
        match self.get(column)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch(column, "text", other)),
        }
    }

    /// Text column that may be NULL. Blobs are accepted if they hold UTF-8.
    pub fn get_opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Blob(b) => String::from_utf8(b.clone())
                .map(Some)
                .map_err(|_| mismatch(column, "text", &Value::Blob(Vec::new()))),
            other => Err(mismatch(column, "text", other)),
        }
    }
}

fn mismatch(column: &str, expected: &str, found: &Value) -> IndexError {
    let found = match found {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    };
    IndexError::Storage(format!(
        "column {column}: expected {expected}, found {found}"
    ))
}
