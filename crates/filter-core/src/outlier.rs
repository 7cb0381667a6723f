//! Persisted anomaly records (C6): one row per detected outlier, keyed so a
//! future per-filter prefix scan never has to touch the whole table.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::Result;
use crate::kv::{self, Kv};
use crate::model::Outlier;

/// `filter_outliers` keys look like `f-<filterId>-<uuid>`: the filter id up
/// front makes a future per-filter prefix scan possible without touching
/// the rest of the table; the trailing uuid guarantees uniqueness even for
/// two outliers reported with the same timestamp and score.
fn outlier_key(filter_id: Uuid, outlier_id: Uuid) -> String {
    format!("f-{filter_id}-{outlier_id}")
}

/// CRUD-ish surface over the `filter_outliers` table. Holds no in-memory
/// state of its own: every call is a KV round trip.
pub struct OutlierStore {
    kv: Arc<Kv>,
}

impl OutlierStore {
    pub fn new(kv: Arc<Kv>) -> Self {
        Self { kv }
    }

    /// Record a new outlier against `filter_id`, returning the generated
    /// record id (not currently surfaced further, but handy for tests).
    pub fn add_outlier(&self, filter_id: Uuid, timestamp: i64, score: f64, details: &str) -> Result<Uuid> {
        let outlier_id = Uuid::new_v4();
        let outlier = Outlier { filter_id, timestamp, score, details: details.to_string() };
        let bytes = serde_json::to_vec(&outlier)
            .map_err(|e| crate::error::Error::Decode(format!("failed to encode outlier: {e}")))?;
        self.kv.put(kv::FILTER_OUTLIERS, &outlier_key(filter_id, outlier_id), &bytes)?;
        Ok(outlier_id)
    }

    /// Every key currently stored under `filter_outliers`, for tests and
    /// future per-filter prefix scans.
    pub fn list_keys_for(&self, filter_id: Uuid) -> Result<Vec<String>> {
        self.kv.scan_prefix(kv::FILTER_OUTLIERS, &format!("f-{filter_id}-"))
    }

    /// Delete every outlier ever recorded. Collects keys under a read
    /// transaction first, then deletes them in one write transaction, so
    /// iteration never shares a transaction with mutation.
    pub fn truncate_all(&self) -> Result<()> {
        let keys: Vec<String> = self.kv.scan_all(kv::FILTER_OUTLIERS)?.into_iter().map(|(k, _)| k).collect();
        self.kv.delete_many(kv::FILTER_OUTLIERS, &keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_store() -> (tempfile::TempDir, OutlierStore) {
        let dir = tempdir().expect("tempdir");
        let kv = Arc::new(Kv::open(dir.path().join("db.redb")).expect("open kv"));
        (dir, OutlierStore::new(kv))
    }

    #[test]
    fn add_outlier_keys_are_prefixed_by_filter_id() {
        let (_dir, store) = fresh_store();
        let fid = Uuid::new_v4();

        store.add_outlier(fid, 1_700_000_000, 3.14, "x").unwrap();
        store.add_outlier(fid, 1_700_000_000, 3.14, "x").unwrap();

        let keys = store.list_keys_for(fid).unwrap();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
        for key in &keys {
            assert!(key.starts_with(&format!("f-{fid}-")));
        }
    }

    #[test]
    fn truncate_all_empties_the_table() {
        let (_dir, store) = fresh_store();
        let fid = Uuid::new_v4();
        store.add_outlier(fid, 1, 1.0, "a").unwrap();
        store.add_outlier(Uuid::new_v4(), 2, 2.0, "b").unwrap();

        store.truncate_all().unwrap();

        assert!(store.kv.scan_all(kv::FILTER_OUTLIERS).unwrap().is_empty());
    }
}
