//! Search predicates over the `records` table.
//!
//! A search is a conjunction of filters. Each filter renders to a fixed SQL
//! fragment plus the values bound to its placeholders; fragments are
//! `&'static str`, so caller input can only reach a statement as a parameter.
//! This holds for metadata field names too.

use std::collections::BTreeMap;

use rusqlite::types::Value;

use crate::errors::{IndexError, Result};

/// Reserved key: lower bound (inclusive) on the record id.
pub const START_ID: &str = "start_id";
/// Reserved key: upper bound (inclusive) on the record id.
pub const END_ID: &str = "end_id";

const ID_FROM: &str = "id >= ?";
const ID_TO: &str = "id <= ?";

// Top-level key equality via json_each; no JSON path is ever assembled from
// the key. Values compare by their text rendering.
const FIELD_EQUALS: &str = "EXISTS (SELECT 1 FROM json_each(COALESCE(NULLIF(records.extra_metadata, ''), '{}')) AS m \
     WHERE m.key = ? AND (CASE m.type \
         WHEN 'true' THEN 'true' \
         WHEN 'false' THEN 'false' \
         WHEN 'null' THEN 'null' \
         ELSE CAST(m.value AS TEXT) END) = ?)";

const SELECT_RECORDS: &str =
    "SELECT id, data_filename, metadata_filename, extra_metadata FROM records";

/// One search condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    IdFrom(i64),
    IdTo(i64),
    /// Exact match on a top-level metadata field.
    Field { key: String, value: String },
}

/// A SQL fragment paired with the parameters for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub fragment: &'static str,
    pub params: Vec<Value>,
}

impl Filter {
    pub fn predicate(&self) -> Predicate {
        match self {
            Self::IdFrom(id) => Predicate {
                fragment: ID_FROM,
                params: vec![Value::Integer(*id)],
            },
            Self::IdTo(id) => Predicate {
                fragment: ID_TO,
                params: vec![Value::Integer(*id)],
            },
            Self::Field { key, value } => Predicate {
                fragment: FIELD_EQUALS,
                params: vec![Value::Text(key.clone()), Value::Text(value.clone())],
            },
        }
    }
}

/// A validated, non-empty search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    filters: Vec<Filter>,
}

impl SearchQuery {
    /// Build a search from raw query-string pairs.
    ///
    /// `start_id` / `end_id` must parse as integers. Every other key, including
    /// the empty key and keys that name table columns, is a metadata filter.
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self> {
        let mut filters = Vec::with_capacity(params.len());
        for (key, value) in params {
            let filter = match key.as_str() {
                START_ID => Filter::IdFrom(parse_id(START_ID, value)?),
                END_ID => Filter::IdTo(parse_id(END_ID, value)?),
                _ => Filter::Field {
                    key: key.clone(),
                    value: value.clone(),
                },
            };
            filters.push(filter);
        }
        Self::new(filters)
    }

    pub fn new(filters: Vec<Filter>) -> Result<Self> {
        if filters.is_empty() {
            return Err(IndexError::validation("no search parameters provided"));
        }
        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn predicates(&self) -> Vec<Predicate> {
        self.filters.iter().map(Filter::predicate).collect()
    }

    /// Render the full statement and its positional parameters.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let predicates = self.predicates();
        let clause = predicates
            .iter()
            .map(|p| p.fragment)
            .collect::<Vec<_>>()
            .join(" AND ");
        let params = predicates.into_iter().flat_map(|p| p.params).collect();
        (format!("{SELECT_RECORDS} WHERE {clause}"), params)
    }
}

/// Collect query-string pairs, refusing a key that appears more than once.
pub fn collect_params(
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();
    for (key, value) in pairs {
        if params.contains_key(&key) {
            return Err(IndexError::validation(format!(
                "repeated search parameter: {key}"
            )));
        }
        params.insert(key, value);
    }
    Ok(params)
}

fn parse_id(key: &str, raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| IndexError::validation(format!("{key} must be an integer, got {raw:?}")))
}
