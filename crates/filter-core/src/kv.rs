//! Thin wrapper around the embedded KV store.
//!
//! The filter manager is the sole owner of this handle. Every other
//! component (registry, stats store, outlier store) goes through the small
//! surface exposed here rather than touching `redb` transactions directly,
//! so the "don't mix iteration and mutation in one transaction" rule (see
//! `TruncateAll` and the retention sweeper) only needs to be enforced in one
//! place.

use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

use crate::error::Result;

pub(crate) const FILTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("filters");
pub(crate) const FILTER_STATS: TableDefinition<&str, &[u8]> = TableDefinition::new("filter_stats");
pub(crate) const FILTER_OUTLIERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("filter_outliers");

/// Owns the `redb::Database` handle and exposes table-scoped operations.
#[derive(Debug)]
pub struct Kv {
    db: Database,
}

impl Kv {
    /// Open (or create) the database file at `path`, creating all three
    /// tables if they do not already exist. Failure to open is fatal at
    /// startup; the caller is expected to propagate the error and exit.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;

        // Touch every table once so later reads never have to special-case
        // "table does not exist yet".
        let txn = db.begin_write()?;
        {
            txn.open_table(FILTERS)?;
            txn.open_table(FILTER_STATS)?;
            txn.open_table(FILTER_OUTLIERS)?;
        }
        txn.commit()?;

        Ok(Self { db })
    }

    /// Fetch a single value from `table` by exact key.
    pub fn get(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        Ok(t.get(key)?.map(|v| v.value().to_vec()))
    }

    /// Insert (overwriting) a single value into `table`.
    pub fn put(&self, table: TableDefinition<&str, &[u8]>, key: &str, value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            t.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a single key from `table`. Returns true if it existed.
    pub fn delete(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut t = txn.open_table(table)?;
            t.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(existed)
    }

    /// Collect every `(key, value)` pair in `table`. Used by the registry's
    /// synchronous list load and the stats retention sweeper; both need a
    /// read-only snapshot before they decide what (if anything) to mutate.
    pub fn scan_all(&self, table: TableDefinition<&str, &[u8]>) -> Result<Vec<(String, Vec<u8>)>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let mut out = Vec::new();
        for entry in t.iter()? {
            let (k, v) = entry?;
            out.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(out)
    }

    /// Collect every key under `table` whose string form starts with
    /// `prefix`. A full-table scan rather than a true range scan: simple,
    /// correct, and fine at the scale this store operates at (outlier
    /// counts per filter, not a global event firehose).
    pub fn scan_prefix(&self, table: TableDefinition<&str, &[u8]>, prefix: &str) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let mut out = Vec::new();
        for entry in t.iter()? {
            let (k, _) = entry?;
            if k.value().starts_with(prefix) {
                out.push(k.value().to_string());
            }
        }
        Ok(out)
    }

    /// Delete every key in `keys` from `table` in one write transaction.
    /// Callers must have already collected `keys` from a separate read
    /// transaction (see module docs).
    pub fn delete_many(&self, table: TableDefinition<&str, &[u8]>, keys: &[String]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            for key in keys {
                t.remove(key.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}
