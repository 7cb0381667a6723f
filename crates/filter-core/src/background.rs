//! The single dedicated background worker thread.
//!
//! Stats writes, list-cache refreshes, and reaper deletes are all
//! fire-and-forget from the caller's point of view: each is encoded (or
//! otherwise reduced to owned data) at the call site and handed off here as
//! a [`Job`]. A bounded channel plus a single worker thread keeps the KV
//! store's single-writer discipline simple: at most one background write
//! transaction is ever in flight, and it never fights an in-progress
//! foreground one for longer than a transaction's lifetime.
//!
//! A full channel means the worker has fallen behind; rather than block the
//! caller (which could stall an ingest path behind a slow sweep), the job
//! is dropped and a warning logged. For [`Job::PersistStats`] this is safe
//! because every job carries a full snapshot of the current container, so
//! a dropped job is superseded by whatever mutation triggers the next one.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use uuid::Uuid;

use crate::kv::{self, Kv};
use crate::registry::Registry;

/// Work handed to the background worker thread.
pub(crate) enum Job {
    /// Persist an already-encoded stats blob for `filter_id`.
    PersistStats { filter_id: Uuid, bytes: Vec<u8> },
    /// Delete a filter by id (used by the temp-filter reaper).
    DeleteFilter { filter_id: Uuid },
    /// Recompute and install a fresh list-cache snapshot.
    RefreshList,
}

/// Handle to the running background worker: a sender for new jobs and the
/// thread's `JoinHandle`, used during shutdown.
pub(crate) struct Worker {
    /// `Option` so [`Drop::drop`] can explicitly release this clone before
    /// joining the thread. A plain field would still be alive (borrowed,
    /// not yet dropped) for the whole body of `drop`, so `handle.join()`
    /// would wait forever on a channel this very field keeps open.
    sender: Option<SyncSender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn the worker thread with a channel of the given capacity.
    ///
    /// The thread is handed a [`Weak`] reference to `registry`, not an
    /// owned `Arc`: the registry's job sender (attached via
    /// [`Registry::attach_job_sender`]) is itself a clone of `sender`, so an
    /// owned `Arc<Registry>` living inside this thread would keep that
    /// clone alive forever, which would keep the channel open forever, which
    /// would keep this thread from ever exiting. A `Weak` lets the thread
    /// reach the registry while it is still alive elsewhere, without itself
    /// being a reason it stays alive.
    pub(crate) fn spawn(kv: Arc<Kv>, registry: Weak<Registry>, queue_depth: usize) -> Self {
        let (sender, receiver) = sync_channel(queue_depth);
        let handle = std::thread::Builder::new()
            .name("lsd-core-persister".into())
            .spawn(move || run(receiver, kv, registry))
            .expect("failed to spawn background persister thread");

        Self { sender: Some(sender), handle: Some(handle) }
    }

    /// A clone of the job sender, handed to the registry and stats store so
    /// they can submit their own fire-and-forget jobs.
    pub(crate) fn sender(&self) -> SyncSender<Job> {
        self.sender.as_ref().expect("worker sender taken before shutdown").clone()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Release this struct's own sender clone first. Combined with the
        // registry's and stats store's clones already having dropped by the
        // time `FilterManager`'s field-order drop reaches this one, the
        // channel is now fully closed: `run`'s receive loop drains whatever
        // is queued and returns.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(receiver: Receiver<Job>, kv: Arc<Kv>, registry: Weak<Registry>) {
    for job in receiver.iter() {
        match job {
            Job::PersistStats { filter_id, bytes } => {
                if let Err(err) = kv.put(kv::FILTER_STATS, &filter_id.to_string(), &bytes) {
                    tracing::error!(%filter_id, %err, "failed to persist stats blob");
                }
            }
            Job::DeleteFilter { filter_id } => {
                let Some(registry) = registry.upgrade() else { continue };
                if let Err(err) = registry.delete(filter_id) {
                    tracing::warn!(%filter_id, %err, "background filter delete failed");
                }
            }
            Job::RefreshList => {
                let Some(registry) = registry.upgrade() else { continue };
                if let Err(err) = registry.refresh_cache() {
                    tracing::warn!(%err, "background filter list refresh failed");
                }
            }
        }
    }
}
