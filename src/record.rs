//! Record: the single persisted entity of the index.
//!
//! A record pairs two opaque file references with a schema-less metadata bag.
//! The bag is stored as JSON text and only interpreted when a search asks for
//! one of its fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, Result};
use crate::storage::Row;

/// Client-supplied metadata.
///
/// BTreeMap keeps keys sorted, so the serialized text is canonical.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub data_filename: String,
    pub metadata_filename: String,
    #[serde(default)]
    pub extra_metadata: Metadata,
}

/// Create input. Filenames are optional here so that a missing field is a
/// validation failure rather than a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(default)]
    pub data_filename: Option<String>,
    #[serde(default)]
    pub metadata_filename: Option<String>,
    #[serde(default)]
    pub extra_metadata: Option<Metadata>,
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecord<'a> {
    pub data_filename: &'a str,
    pub metadata_filename: &'a str,
    pub metadata_json: String,
}

impl NewRecord {
    pub fn new(data_filename: impl Into<String>, metadata_filename: impl Into<String>) -> Self {
        Self {
            data_filename: Some(data_filename.into()),
            metadata_filename: Some(metadata_filename.into()),
            extra_metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.extra_metadata = Some(metadata);
        self
    }

    /// Check required fields and serialize the metadata bag.
    pub fn validate(&self) -> Result<ValidRecord<'_>> {
        let data_filename = required(self.data_filename.as_deref(), "data_filename")?;
        let metadata_filename = required(self.metadata_filename.as_deref(), "metadata_filename")?;
        let metadata_json = match &self.extra_metadata {
            Some(meta) => encode_metadata(meta)?,
            None => "{}".to_string(),
        };
        Ok(ValidRecord {
            data_filename,
            metadata_filename,
            metadata_json,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(IndexError::validation(format!("{field} must not be empty"))),
        None => Err(IndexError::validation(format!(
            "missing required field: {field}"
        ))),
    }
}

/// Serialize metadata to its canonical stored text.
pub fn encode_metadata(meta: &Metadata) -> Result<String> {
    Ok(serde_json::to_string(meta)?)
}

/// Parse stored metadata text. NULL, empty text and a JSON `null` all read
/// back as an empty bag; any other non-object is treated as corruption.
pub fn decode_metadata(text: Option<&str>) -> Result<Metadata> {
    let text = match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return Ok(Metadata::new()),
    };
    match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        serde_json::Value::Null => Ok(Metadata::new()),
        other => Err(IndexError::Storage(format!(
            "extra_metadata is not a JSON object: {other}"
        ))),
    }
}

impl Record {
    /// Map a `records` row back into a record.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i64("id")?,
            data_filename: row.get_text("data_filename")?,
            metadata_filename: row.get_text("metadata_filename")?,
            extra_metadata: decode_metadata(row.get_opt_text("extra_metadata")?.as_deref())?,
        })
    }
}
