//! Record query engine: create, fetch and search over the storage adapter.
//!
//! Each operation is one parameterized statement run inside a scoped
//! transaction. The engine never touches the database file itself.

use std::collections::BTreeMap;

use rusqlite::types::Value;
use tracing::debug;

use crate::errors::{IndexError, Result};
use crate::ids::IdGenerator;
use crate::query::SearchQuery;
use crate::record::{NewRecord, Record};
use crate::storage::SqliteStore;

const INSERT_RECORD: &str =
    "INSERT INTO records (id, data_filename, metadata_filename, extra_metadata) VALUES (?, ?, ?, ?)";

const SELECT_BY_ID: &str =
    "SELECT id, data_filename, metadata_filename, extra_metadata FROM records WHERE id = ?";

#[derive(Debug)]
pub struct RecordEngine {
    store: SqliteStore,
    ids: IdGenerator,
}

impl RecordEngine {
    pub fn new(store: SqliteStore) -> Result<Self> {
        Self::with_ids(store, IdGenerator::new())
    }

    /// Ids continue after the largest one already in the store.
    pub fn with_ids(store: SqliteStore, ids: IdGenerator) -> Result<Self> {
        let ids = match store.max_id()? {
            Some(max) => ids.starting_after(max),
            None => ids,
        };
        Ok(Self { store, ids })
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Validate and insert a record. Returns the assigned id.
    ///
    /// Nothing is written when validation fails.
    pub fn create(&self, new: &NewRecord) -> Result<i64> {
        let valid = new.validate()?;
        let id = self.ids.next_id();
        let params = [
            Value::Integer(id),
            Value::Text(valid.data_filename.to_string()),
            Value::Text(valid.metadata_filename.to_string()),
            Value::Text(valid.metadata_json),
        ];
        self.store.scoped(|scope| scope.execute(INSERT_RECORD, &params))?;
        debug!(id, "record created");
        Ok(id)
    }

    /// Fetch one record by id.
    pub fn get(&self, id: i64) -> Result<Record> {
        let rows = self
            .store
            .scoped(|scope| scope.query(SELECT_BY_ID, &[Value::Integer(id)]))?;
        match rows.first() {
            Some(row) => Record::from_row(row),
            None => Err(IndexError::NotFound(id)),
        }
    }

    /// Search by id range and/or exact metadata field values.
    ///
    /// Results come back in storage order; no ordering is imposed.
    pub fn search(&self, params: &BTreeMap<String, String>) -> Result<Vec<Record>> {
        let query = SearchQuery::from_params(params)?;
        self.run(&query)
    }

    /// Run an already-built search.
    pub fn run(&self, query: &SearchQuery) -> Result<Vec<Record>> {
        let (sql, params) = query.to_sql();
        let rows = self.store.scoped(|scope| scope.query(&sql, &params))?;
        debug!(filters = query.filters().len(), hits = rows.len(), "search");
        rows.iter().map(Record::from_row).collect()
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }
}
