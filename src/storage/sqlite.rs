//! SQLite backend. One durable file, one `records` table.
//!
//! Every unit of work opens its own connection, runs inside a transaction and
//! closes the connection before returning. Nothing is held between calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::storage::Row;

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;

    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY,
        data_filename TEXT NOT NULL,
        metadata_filename TEXT NOT NULL,
        extra_metadata JSON
    );
";

/// Handle on the storage file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { path, busy_timeout };
        store.initialize()?;
        info!(path = %store.path.display(), "record store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the `records` table if it does not exist. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Run `f` inside a transaction on a fresh connection.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err` (or
    /// unwinds), and closes the connection on every path.
    pub fn scoped<T>(&self, f: impl FnOnce(&Scope<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.connect()?;
        let outcome = {
            let scope = Scope {
                tx: conn.transaction()?,
            };
            match f(&scope) {
                Ok(value) => scope.tx.commit().map(|()| value).map_err(Into::into),
                Err(err) => {
                    if let Err(rb) = scope.tx.rollback() {
                        warn!(error = %rb, "rollback failed");
                    }
                    Err(err)
                }
            }
        };
        if let Err((_, err)) = conn.close() {
            warn!(error = %err, "closing connection failed");
        }
        outcome
    }

    /// Largest stored id, if any.
    pub fn max_id(&self) -> Result<Option<i64>> {
        self.scoped(|scope| {
            let rows = scope.query("SELECT MAX(id) AS max_id FROM records", &[])?;
            match rows.first().map(|row| row.get("max_id")).transpose()? {
                Some(Value::Integer(id)) => Ok(Some(*id)),
                _ => Ok(None),
            }
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize> {
        self.scoped(|scope| {
            let rows = scope.query("SELECT COUNT(*) AS n FROM records", &[])?;
            match rows.first() {
                Some(row) => Ok(row.get_i64("n")? as usize),
                None => Ok(0),
            }
        })
    }
}

/// An open transaction. Only reachable through [`SqliteStore::scoped`].
pub struct Scope<'conn> {
    tx: Transaction<'conn>,
}

impl Scope<'_> {
    /// Run a statement that returns no rows. Returns the affected row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        debug!(sql, params = params.len(), "execute");
        Ok(self.tx.execute(sql, params_from_iter(params.iter()))?)
    }

    /// Run a query and collect every row.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!(sql, params = params.len(), "query");
        let mut stmt = self.tx.prepare(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(row.get::<_, Value>(i)?);
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }
}
