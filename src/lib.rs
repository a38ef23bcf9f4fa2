//! Record index: a small record store with a dynamic query engine.
//!
//! Records reference externally stored data and metadata files and carry a
//! schema-less JSON metadata bag. They can be fetched by id or searched by id
//! range and exact metadata field values. Storage is a single SQLite file.
//!
//! ```ignore
//! use record_index::engine::RecordEngine;
//! use record_index::record::NewRecord;
//! use record_index::storage::SqliteStore;
//!
//! let store = SqliteStore::open("data/database.db", std::time::Duration::from_secs(5))?;
//! let engine = RecordEngine::new(store)?;
//! let id = engine.create(&NewRecord::new("blob.bin", "blob.meta.json"))?;
//! let record = engine.get(id)?;
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod ids;
pub mod query;
pub mod record;
pub mod server;
pub mod storage;

pub use engine::RecordEngine;
pub use errors::{IndexError, Result};
pub use record::{Metadata, NewRecord, Record};
