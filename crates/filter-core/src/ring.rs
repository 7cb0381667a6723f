//! The per-filter bounded result ring (C4).
//!
//! One read/write lock guards the whole map of rings: ring operations are
//! short (a handful of pushes/pops), so a single lock is cheap enough and
//! keeps the locking discipline simple. Id allocation for a filter happens
//! under that same write-lock acquisition as its append, not a separate
//! lock: two concurrent `add_results` calls on the same filter would
//! otherwise be able to allocate ids in one order but append in the other,
//! leaving the ring (and therefore `get_since`) out of id order.

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::model::FilterResult;

/// One filter's allocator state plus its bounded window of recent matches.
#[derive(Debug, Default)]
struct FilterRing {
    /// Last id assigned to this filter; the next batch starts at `counter + 1`.
    counter: u64,
    entries: VecDeque<FilterResult>,
}

/// In-memory, best-effort store of recent matches per filter.
#[derive(Debug)]
pub struct ResultRing {
    rings: RwLock<HashMap<Uuid, FilterRing>>,
    capacity: usize,
}

impl ResultRing {
    /// Create a new ring store with the given per-filter capacity `M`.
    pub fn new(capacity: usize) -> Self {
        Self { rings: RwLock::new(HashMap::new()), capacity }
    }

    /// Append `lines` to `filter_id`'s ring, assigning each a fresh
    /// monotonic id. Returns the ids assigned, in submission order.
    ///
    /// If the ring would exceed capacity, the oldest entries are evicted
    /// first. If `lines` alone is longer than the capacity, only the last
    /// `capacity` lines of the batch are kept. Id allocation and the append
    /// happen under one write-lock acquisition on `filter_id`'s entry, so
    /// concurrent batches on the same filter can never land in the ring out
    /// of id order.
    pub fn add_results(&self, filter_id: Uuid, lines: Vec<String>) -> Vec<u64> {
        if lines.is_empty() {
            return Vec::new();
        }

        let mut rings = self.rings.write();
        let ring = rings.entry(filter_id).or_default();

        let start = ring.counter + 1;
        ring.counter += lines.len() as u64;

        let mut results: Vec<FilterResult> = lines
            .into_iter()
            .enumerate()
            .map(|(i, raw)| FilterResult::from_raw(start + i as u64, raw))
            .collect();

        // A single batch larger than capacity only ever contributes its
        // tail; the ids it drops here are still monotonic and still
        // allocated, they are just never observable.
        if results.len() > self.capacity {
            let drop = results.len() - self.capacity;
            results.drain(0..drop);
        }

        let ids = results.iter().map(|r| r.id).collect();

        let total = ring.entries.len() + results.len();
        if total > self.capacity {
            let overflow = total - self.capacity;
            for _ in 0..overflow {
                ring.entries.pop_front();
            }
        }
        ring.entries.extend(results);

        ids
    }

    /// Return every `_raw` line with id strictly greater than `offset`, in
    /// id order, plus the largest id returned (or `offset` if nothing
    /// matched or the filter has no ring yet).
    pub fn get_since(&self, filter_id: Uuid, offset: u64) -> (Vec<String>, u64) {
        let rings = self.rings.read();
        let Some(ring) = rings.get(&filter_id) else {
            return (Vec::new(), offset);
        };

        let mut out = Vec::new();
        let mut max_offset = offset;
        for entry in ring.entries.iter() {
            if entry.id > offset {
                out.push(entry.raw().to_string());
                max_offset = max_offset.max(entry.id);
            }
        }
        (out, max_offset)
    }

    /// Current number of buffered lines for `filter_id` (0 if unknown).
    #[cfg(test)]
    pub fn len(&self, filter_id: Uuid) -> usize {
        self.rings.read().get(&filter_id).map(|r| r.entries.len()).unwrap_or(0)
    }

    /// Ids exactly as stored in the ring, in storage order. Used by tests to
    /// check the ring itself stays in id order, not just that `get_since`
    /// happens to return its contents sorted.
    #[cfg(test)]
    pub fn ids_in_storage_order(&self, filter_id: Uuid) -> Vec<u64> {
        self.rings
            .read()
            .get(&filter_id)
            .map(|r| r.entries.iter().map(|e| e.id).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ids_are_monotonic_and_in_order() {
        let ring = ResultRing::new(10_000);
        let fid = Uuid::new_v4();

        let ids_a = ring.add_results(fid, lines(&["a", "b", "c"]));
        let ids_b = ring.add_results(fid, lines(&["d", "e"]));

        assert_eq!(ids_a, vec![1, 2, 3]);
        assert_eq!(ids_b, vec![4, 5]);

        let (got, max_offset) = ring.get_since(fid, 0);
        assert_eq!(got, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(max_offset, 5);

        let (got, max_offset) = ring.get_since(fid, 5);
        assert!(got.is_empty());
        assert_eq!(max_offset, 5);
    }

    #[test]
    fn eviction_keeps_the_tail_and_preserves_ids() {
        let ring = ResultRing::new(3);
        let fid = Uuid::new_v4();

        ring.add_results(fid, lines(&["1", "2"]));
        ring.add_results(fid, lines(&["3", "4", "5"]));

        assert_eq!(ring.len(fid), 3);
        let (got, max_offset) = ring.get_since(fid, 2);
        assert_eq!(got, vec!["3", "4", "5"]);
        assert_eq!(max_offset, 5);
    }

    #[test]
    fn a_single_batch_larger_than_capacity_is_truncated_to_its_tail() {
        let ring = ResultRing::new(3);
        let fid = Uuid::new_v4();

        let ids = ring.add_results(fid, lines(&["1", "2", "3", "4", "5"]));
        assert_eq!(ids, vec![3, 4, 5]);

        let (got, max_offset) = ring.get_since(fid, 0);
        assert_eq!(got, vec!["3", "4", "5"]);
        assert_eq!(max_offset, 5);
    }

    #[test]
    fn unknown_filter_returns_empty() {
        let ring = ResultRing::new(10);
        let (got, max_offset) = ring.get_since(Uuid::new_v4(), 7);
        assert!(got.is_empty());
        assert_eq!(max_offset, 7);
    }

    #[test]
    fn concurrent_batches_on_the_same_filter_are_never_observed_out_of_id_order() {
        use std::sync::Arc;

        let ring = Arc::new(ResultRing::new(10_000));
        let fid = Uuid::new_v4();

        let writers: Vec<_> = (0..8)
            .map(|batch| {
                let ring = ring.clone();
                std::thread::spawn(move || {
                    let batch_lines: Vec<String> =
                        (0..16).map(|i| format!("batch-{batch}-line-{i}")).collect();
                    ring.add_results(fid, batch_lines)
                })
            })
            .collect();

        for writer in writers {
            writer.join().expect("writer thread panicked");
        }

        let (_, max_offset) = ring.get_since(fid, 0);
        assert_eq!(max_offset, 8 * 16);

        let stored_ids = ring.ids_in_storage_order(fid);
        assert_eq!(stored_ids.len(), 8 * 16);
        assert!(stored_ids.windows(2).all(|pair| pair[0] < pair[1]), "ring left out of id order: {stored_ids:?}");
    }
}
