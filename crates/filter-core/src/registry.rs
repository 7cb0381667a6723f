//! Filter CRUD plus the read-through list cache (C3) and the inline
//! temp-filter reaper (C7).

use std::sync::mpsc::SyncSender;
use std::sync::OnceLock;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::background::Job;
use crate::codec::{decode_filter, encode_filter};
use crate::error::{Error, Result};
use crate::kv::{self, Kv};
use crate::model::Filter;

/// Reserved prefix marking a filter as temporary; see module docs on the
/// reaping rule in [`Registry::reap_stale_temp_filters`].
pub const TEMP_PREFIX: &str = "__tmp__";

/// How long a temporary filter is allowed to live before it is reaped.
pub const TEMP_FILTER_TTL_SECS: i64 = 3_600;

/// Filter metadata CRUD over the embedded KV store, with a read-through
/// list cache.
///
/// The job sender is attached after construction (see
/// [`Registry::attach_job_sender`]) because the background worker that
/// drains it needs a reference to this registry to process its own jobs —
/// constructing both at once would require a cycle. Until attached,
/// asynchronous refresh/reap calls are silently skipped; the synchronous
/// paths (`Create`, `Delete`, `GetById`) are unaffected.
pub struct Registry {
    kv: std::sync::Arc<Kv>,
    cache: RwLock<Option<Vec<Filter>>>,
    job_sender: OnceLock<SyncSender<Job>>,
}

impl Registry {
    pub fn new(kv: std::sync::Arc<Kv>) -> Self {
        Self { kv, cache: RwLock::new(None), job_sender: OnceLock::new() }
    }

    /// Wire up the background job sender. Called once during manager
    /// construction, after the worker thread has been spawned.
    pub(crate) fn attach_job_sender(&self, sender: SyncSender<Job>) {
        let _ = self.job_sender.set(sender);
    }

    fn submit(&self, job: Job) {
        if let Some(sender) = self.job_sender.get() {
            if sender.try_send(job).is_err() {
                tracing::warn!("registry background queue unavailable, dropping job");
            }
        }
    }

    /// Create a new filter. Fails with [`Error::Conflict`] if a filter with
    /// the same case-insensitive name already exists, and with
    /// [`Error::Validation`] on an empty name or regex.
    pub fn create(&self, name: &str, client_host: &str, regex: &str) -> Result<Uuid> {
        if name.trim().is_empty() {
            return Err(Error::Validation("filter name must not be empty".into()));
        }
        if regex.is_empty() {
            return Err(Error::Validation("filter regex must not be empty".into()));
        }

        for existing in self.list()? {
            if existing.name.eq_ignore_ascii_case(name) {
                return Err(Error::Conflict(format!("filter named {name:?} already exists")));
            }
        }

        let id = Uuid::new_v4();
        let filter = Filter {
            id,
            name: name.to_string(),
            regex: regex.to_string(),
            client_host: client_host.to_string(),
            stats: Default::default(),
        };
        self.kv.put(kv::FILTERS, &id.to_string(), &encode_filter(&filter))?;
        self.invalidate_cache();
        Ok(id)
    }

    /// Look up a filter by id. Stats are loaded lazily from the
    /// `filter_stats` table so a fresh process still sees prior counters.
    pub fn get_by_id(&self, id: Uuid) -> Result<Option<Filter>> {
        let Some(bytes) = self.kv.get(kv::FILTERS, &id.to_string())? else {
            return Ok(None);
        };
        let mut filter = decode_filter(&bytes)?;

        if let Some(stats_bytes) = self.kv.get(kv::FILTER_STATS, &id.to_string())? {
            match crate::codec::decode_stats(&stats_bytes) {
                Ok(stats) => filter.stats = stats,
                Err(err) => {
                    tracing::warn!(%id, %err, "stats blob failed to decode, treating as empty");
                }
            }
        }

        Ok(Some(filter))
    }

    /// Look up a filter by name. A UUID-shaped argument is treated as an
    /// id lookup; otherwise a case-insensitive scan of the cached list.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Filter>> {
        if let Ok(id) = Uuid::parse_str(name) {
            return self.get_by_id(id);
        }
        let list = self.list()?;
        Ok(list.into_iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// Read-through list: serves the cache if populated (kicking off an
    /// asynchronous refresh), otherwise performs a synchronous load.
    pub fn list(&self) -> Result<Vec<Filter>> {
        if let Some(cached) = self.cache.read().clone() {
            self.submit(Job::RefreshList);
            return Ok(cached);
        }
        self.load_and_cache()
    }

    /// Force a synchronous reload of the list cache. Used by the
    /// background worker to service [`Job::RefreshList`] and directly by
    /// [`Registry::list`] on a cold cache.
    pub(crate) fn refresh_cache(&self) -> Result<()> {
        self.load_and_cache()?;
        Ok(())
    }

    fn load_and_cache(&self) -> Result<Vec<Filter>> {
        let raw = self.kv.scan_all(kv::FILTERS)?;
        let mut live = Vec::with_capacity(raw.len());
        let now = crate::clock::now_unix();

        for (_, bytes) in raw {
            let filter = match decode_filter(&bytes) {
                Ok(f) => f,
                Err(err) => {
                    tracing::warn!(%err, "dropping undecodable filter record from list");
                    continue;
                }
            };

            if let Some(created_at) = temp_filter_created_at(&filter.name) {
                if now - created_at >= TEMP_FILTER_TTL_SECS {
                    tracing::debug!(id = %filter.id, name = %filter.name, "reaping stale temp filter");
                    self.submit(Job::DeleteFilter { filter_id: filter.id });
                    continue;
                }
            }

            live.push(filter);
        }

        *self.cache.write() = Some(live.clone());
        Ok(live)
    }

    fn invalidate_cache(&self) {
        *self.cache.write() = None;
    }

    /// Remove a filter by id. Returns whether it existed.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let existed = self.kv.delete(kv::FILTERS, &id.to_string())?;
        self.invalidate_cache();
        Ok(existed)
    }
}

/// If `name` has the temp-prefix followed by a decimal unix timestamp,
/// return that timestamp. Anything else (including a malformed suffix)
/// returns `None` — such a name is just treated as an ordinary filter.
fn temp_filter_created_at(name: &str) -> Option<i64> {
    name.strip_prefix(TEMP_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempdir().expect("tempdir");
        let kv = std::sync::Arc::new(Kv::open(dir.path().join("db.redb")).expect("open kv"));
        (dir, Registry::new(kv))
    }

    #[test]
    fn create_then_get_by_name_is_case_insensitive() {
        let (_dir, registry) = fresh_registry();
        let id = registry.create("Errors", "h1", "ERR.*").expect("create");

        let found = registry.get_by_name("errors").expect("lookup").expect("present");
        assert_eq!(found.id, id);
    }

    #[test]
    fn duplicate_name_is_a_conflict() {
        let (_dir, registry) = fresh_registry();
        registry.create("errors", "h1", "ERR.*").expect("create");
        let err = registry.create("ERRORS", "h2", "other").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn empty_name_or_regex_is_rejected() {
        let (_dir, registry) = fresh_registry();
        assert!(matches!(registry.create("", "h1", "x").unwrap_err(), Error::Validation(_)));
        assert!(matches!(registry.create("name", "h1", "").unwrap_err(), Error::Validation(_)));
    }

    #[test]
    fn delete_removes_from_list_and_lookup() {
        let (_dir, registry) = fresh_registry();
        let id = registry.create("errors", "h1", "ERR.*").expect("create");
        assert!(registry.delete(id).expect("delete"));

        assert!(registry.get_by_id(id).expect("lookup").is_none());
        assert!(registry.list().expect("list").is_empty());
    }

    #[test]
    fn uuid_shaped_name_is_treated_as_an_id_lookup() {
        let (_dir, registry) = fresh_registry();
        let id = registry.create("errors", "h1", "ERR.*").expect("create");
        let found = registry.get_by_name(&id.to_string()).expect("lookup").expect("present");
        assert_eq!(found.id, id);
    }

    #[test]
    fn stale_temp_filter_is_excluded_from_list() {
        let (_dir, registry) = fresh_registry();
        let stale_name = format!("{TEMP_PREFIX}{}", crate::clock::now_unix() - 7_200);

        let id = Uuid::new_v4();
        let filter = Filter {
            id,
            name: stale_name,
            regex: "x".into(),
            client_host: "h".into(),
            stats: Default::default(),
        };
        registry.kv.put(kv::FILTERS, &id.to_string(), &encode_filter(&filter)).expect("seed");

        let listed = registry.list().expect("list");
        assert!(listed.iter().all(|f| f.id != id));
    }

    #[test]
    fn fresh_temp_filter_is_included_in_list() {
        let (_dir, registry) = fresh_registry();
        let fresh_name = format!("{TEMP_PREFIX}{}", crate::clock::now_unix());

        let id = Uuid::new_v4();
        let filter = Filter {
            id,
            name: fresh_name,
            regex: "x".into(),
            client_host: "h".into(),
            stats: Default::default(),
        };
        registry.kv.put(kv::FILTERS, &id.to_string(), &encode_filter(&filter)).expect("seed");

        let listed = registry.list().expect("list");
        assert!(listed.iter().any(|f| f.id == id));
    }
}
