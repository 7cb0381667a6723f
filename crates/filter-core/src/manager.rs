//! [`FilterManager`]: the single entry point into the core. Owns the KV
//! handle, the registry, the result ring, the stats store, the outlier
//! store, the background persister thread, and the retention sweeper
//! thread. Every public operation in the spec is a method here.

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use crate::background::Worker;
use crate::error::Result;
use crate::kv::Kv;
use crate::model::{Filter, FilterStats};
use crate::outlier::OutlierStore;
use crate::registry::Registry;
use crate::ring::ResultRing;
use crate::stats::StatsStore;

/// How often the retention sweeper wakes up to trim old stats buckets.
pub const STATS_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Process-wide tunables. Everything here has a sensible default matching
/// the spec; callers embedding this crate (the HTTP adapter's entry point)
/// are expected to expose these as CLI flags or environment variables, not
/// to invent new defaults.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Path to the embedded KV database file.
    pub db_path: std::path::PathBuf,
    /// Per-filter result ring capacity (`M`).
    pub max_msg_memory: usize,
    /// Depth of the background persister's job queue.
    pub persist_queue_depth: usize,
}

impl ManagerConfig {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            max_msg_memory: 10_000,
            persist_queue_depth: 1_024,
        }
    }
}

/// The Filter Manager: owns every piece of persisted and in-memory state
/// described by the spec, and is the only thing that touches the KV handle.
///
/// Cheap to clone-and-share as `Arc<FilterManager>` since its own fields are
/// already `Arc`-backed or otherwise safely shared; the type itself holds
/// no interior `Rc`/non-`Send` state.
pub struct FilterManager {
    registry: Arc<Registry>,
    ring: ResultRing,
    stats: Arc<StatsStore>,
    outliers: OutlierStore,
    worker: Worker,
    sweeper: Option<SweeperHandle>,
}

struct SweeperHandle {
    // Dropping this sender (or sending on it) wakes the sweeper thread's
    // `recv_timeout` immediately, instead of leaving it asleep for up to
    // `STATS_SWEEP_INTERVAL`.
    stop: Option<mpsc::SyncSender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl FilterManager {
    /// Open (or create) the KV store at `config.db_path` and wire up every
    /// component: registry, ring, stats, outliers, background persister,
    /// and the retention sweeper thread. Failure to open the KV store is
    /// the one error in this crate that a caller is expected to treat as
    /// fatal (see spec §7).
    pub fn open(config: ManagerConfig) -> Result<Self> {
        let kv = Arc::new(Kv::open(&config.db_path)?);
        let registry = Arc::new(Registry::new(kv.clone()));
        let worker = Worker::spawn(kv.clone(), Arc::downgrade(&registry), config.persist_queue_depth);
        registry.attach_job_sender(worker.sender());

        let stats = Arc::new(StatsStore::new(kv.clone(), worker.sender()));
        let ring = ResultRing::new(config.max_msg_memory);
        let outliers = OutlierStore::new(kv.clone());

        let sweeper = Some(spawn_sweeper(stats.clone()));

        Ok(Self { registry, ring, stats, outliers, worker, sweeper })
    }

    // ---- C3: filter registry -------------------------------------------

    /// Create a new filter; see [`Registry::create`].
    pub fn create(&self, name: &str, client_host: &str, regex: &str) -> Result<Uuid> {
        self.registry.create(name, client_host, regex)
    }

    /// Look up a filter by id, with its stats container populated.
    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Filter>> {
        let Some(mut filter) = self.registry.get_by_id(id)? else {
            return Ok(None);
        };
        filter.stats = self.stats.get_stats(id)?;
        Ok(Some(filter))
    }

    /// Look up a filter by name (or by id, if `name` is UUID-shaped).
    pub fn get_by_name(&self, name: &str) -> Result<Option<Filter>> {
        let Some(mut filter) = self.registry.get_by_name(name)? else {
            return Ok(None);
        };
        filter.stats = self.stats.get_stats(filter.id)?;
        Ok(Some(filter))
    }

    /// List all live filters (stale temp filters are excluded and reaped
    /// inline; see [`Registry::list`]). Stats are not populated here —
    /// callers that need them should follow up with [`Self::get_by_id`].
    pub fn list(&self) -> Result<Vec<Filter>> {
        self.registry.list()
    }

    /// Delete a filter by id. Does not touch its ring or stats (documented
    /// orphaning; see spec §3.1).
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        self.registry.delete(id)
    }

    // ---- C4: result ring -------------------------------------------------

    /// Append matched lines to `filter_id`'s ring, returning the ids
    /// assigned (empty if `lines` is empty).
    pub fn add_results(&self, filter_id: Uuid, lines: Vec<String>) -> Vec<u64> {
        self.ring.add_results(filter_id, lines)
    }

    /// Read every line with id greater than `offset`, plus the new max
    /// offset to resume from.
    pub fn get_since(&self, filter_id: Uuid, offset: u64) -> (Vec<String>, u64) {
        self.ring.get_since(filter_id, offset)
    }

    // ---- C5: stats store ---------------------------------------------

    /// Additively record `delta` against `(filter_id, metric, bucket)`.
    pub fn add_stats(&self, filter_id: Uuid, metric: u32, bucket: i64, delta: i64) -> Result<()> {
        self.stats.add_stats(filter_id, metric, bucket, delta)
    }

    /// Apply a batch of `f=<id>_m=<metric>_b=<bucket> -> count` entries;
    /// returns how many were accepted (unknown filters / malformed keys are
    /// logged and skipped, not fatal).
    pub fn ingest_batch(&self, entries: &std::collections::HashMap<String, i64>) -> Result<usize> {
        self.stats.ingest_batch(entries)
    }

    /// A snapshot of `filter_id`'s stats, safe to serialize without holding
    /// any lock.
    pub fn get_stats(&self, filter_id: Uuid) -> Result<FilterStats> {
        self.stats.get_stats(filter_id)
    }

    // ---- C6: outlier store ------------------------------------------------

    /// Record a detected anomaly against `filter_id`.
    pub fn add_outlier(&self, filter_id: Uuid, timestamp: i64, score: f64, details: &str) -> Result<Uuid> {
        self.outliers.add_outlier(filter_id, timestamp, score, details)
    }

    /// Delete every outlier ever recorded.
    pub fn truncate_outliers(&self) -> Result<()> {
        self.outliers.truncate_all()
    }

    /// Force the stats retention sweep to run immediately, bypassing the
    /// 5-minute ticker. Exposed for tests; the background thread calls the
    /// same [`StatsStore::sweep_retention`] on its own schedule.
    pub fn run_retention_sweep_now(&self) -> Result<()> {
        self.stats.sweep_retention()
    }
}

impl Drop for FilterManager {
    fn drop(&mut self) {
        // Drop order matters: stop the sweeper (so it submits no further
        // jobs) before the worker's own `Drop` drains and joins.
        self.sweeper.take();
    }
}

fn spawn_sweeper(stats: Arc<StatsStore>) -> SweeperHandle {
    // A rendezvous channel used purely as an interruptible sleep: nothing is
    // ever sent on it in the running case. `recv_timeout` returns `Timeout`
    // when the interval elapses (time to sweep) or `Disconnected` the
    // instant `SweeperHandle::drop` releases its sender (time to shut down),
    // so shutdown never has to wait out the rest of the interval.
    let (stop_tx, stop_rx) = mpsc::sync_channel::<()>(0);

    let handle = std::thread::Builder::new()
        .name("lsd-core-retention-sweeper".into())
        .spawn(move || loop {
            match stop_rx.recv_timeout(STATS_SWEEP_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(err) = stats.sweep_retention() {
                        tracing::error!(%err, "stats retention sweep failed");
                    }
                }
            }
        })
        .expect("failed to spawn retention sweeper thread");

    SweeperHandle { stop: Some(stop_tx), handle: Some(handle) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_manager() -> (tempfile::TempDir, FilterManager) {
        let dir = tempdir().expect("tempdir");
        let manager = FilterManager::open(ManagerConfig::new(dir.path().join("db.redb"))).expect("open");
        (dir, manager)
    }

    #[test]
    fn create_list_delete_roundtrip() {
        let (_dir, manager) = fresh_manager();
        let id = manager.create("errors", "h1", "ERR.*").expect("create");

        let listed = manager.list().expect("list");
        assert!(listed.iter().any(|f| f.id == id));

        assert!(manager.delete(id).expect("delete"));
        assert!(manager.get_by_id(id).expect("lookup").is_none());
        assert!(manager.list().expect("list").iter().all(|f| f.id != id));
    }

    #[test]
    fn get_by_id_surfaces_a_non_nil_stats_container() {
        let (_dir, manager) = fresh_manager();
        let id = manager.create("errors", "h1", "ERR.*").expect("create");

        let filter = manager.get_by_id(id).expect("lookup").expect("present");
        assert!(filter.stats.is_empty());

        manager.add_stats(id, 1, 1000, 5).expect("add stats");
        let filter = manager.get_by_id(id).expect("lookup").expect("present");
        assert_eq!(filter.stats.metrics[&1][&1000], 5);
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let (_dir, manager) = fresh_manager();
        manager.create("errors", "h1", "ERR.*").expect("create");
        let err = manager.create("ERRORS", "h2", "other").unwrap_err();
        assert!(matches!(err, crate::error::Error::Conflict(_)));
    }

    #[test]
    fn end_to_end_tail_scenario() {
        let (_dir, manager) = fresh_manager();
        let id = manager.create("errors", "h1", "ERR.*").expect("create");

        manager.add_results(id, vec!["a".into(), "b".into(), "c".into()]);
        manager.add_results(id, vec!["d".into(), "e".into()]);

        let (lines, max_offset) = manager.get_since(id, 0);
        assert_eq!(lines, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(max_offset, 5);

        let (lines, max_offset) = manager.get_since(id, 5);
        assert!(lines.is_empty());
        assert_eq!(max_offset, 5);
    }

    #[test]
    fn outlier_truncate_all_then_list_is_empty() {
        let (_dir, manager) = fresh_manager();
        let id = manager.create("errors", "h1", "ERR.*").expect("create");
        manager.add_outlier(id, 1_700_000_000, 3.14, "x").expect("outlier");
        manager.add_outlier(id, 1_700_000_000, 3.14, "x").expect("outlier");

        manager.truncate_outliers().expect("truncate");

        let remaining = manager.outliers.list_keys_for(id).expect("keys");
        assert!(remaining.is_empty());
    }

    #[test]
    fn retention_sweep_drops_old_buckets_on_reload() {
        let (_dir, manager) = fresh_manager();
        let id = manager.create("errors", "h1", "ERR.*").expect("create");
        let old_bucket = crate::clock::now_unix() - crate::stats::RETENTION_SECS - 10;

        manager.add_stats(id, 1, old_bucket, 5).expect("add stats");
        // Give the background persister a moment to flush the snapshot
        // written by `add_stats` before the sweep reads it back from KV.
        std::thread::sleep(std::time::Duration::from_millis(50));

        manager.run_retention_sweep_now().expect("sweep");

        // Retention does not touch the live map directly (spec §4.3); a
        // fresh manager over the same file is the simplest way to observe
        // the post-sweep persisted state without reaching into privates.
        drop(manager);
        let manager = FilterManager::open(ManagerConfig::new(_dir.path().join("db.redb"))).expect("reopen");
        let filter = manager.get_by_id(id).expect("lookup").expect("present");
        assert!(filter.stats.metrics.get(&1).map(|s| s.is_empty()).unwrap_or(true));
    }
}
