use std::collections::BTreeMap;

use uuid::Uuid;

/// A persisted, named regular expression that upstream workers evaluate
/// against a log stream.
///
/// `Filter` is a plain record: it holds no back-pointer into the manager
/// that created it. Every operation that needs to mutate a filter's state
/// goes through [`crate::FilterManager`], taking the filter's id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Filter {
    /// Opaque 36-char UUID, immutable after creation.
    pub id: Uuid,
    /// Lower-case `[a-z0-9_]+`, unique case-insensitively.
    pub name: String,
    /// The regular expression text. Stored verbatim; validated upstream.
    pub regex: String,
    /// Network identity of the creator, advisory only.
    pub client_host: String,
    /// This filter's stats container. Never `None` once a filter has been
    /// loaded through [`crate::FilterManager::get_by_id`] — empty if no
    /// stats have been written yet.
    pub stats: FilterStats,
}

/// One matched line, tagged with a per-filter monotonic id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilterResult {
    /// Strictly increasing per filter; never reused within a process.
    pub id: u64,
    /// Keyed fields for this result. Today only `_raw` is populated, but
    /// the mapping shape leaves room for future fields without breaking
    /// the ring's wire contract.
    pub fields: BTreeMap<String, String>,
}

impl FilterResult {
    /// Build a result from a single matched line, the common case.
    pub fn from_raw(id: u64, raw: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("_raw".to_string(), raw.into());
        Self { id, fields }
    }

    /// The `_raw` field, or an empty string if absent.
    pub fn raw(&self) -> &str {
        self.fields.get("_raw").map(String::as_str).unwrap_or("")
    }
}

/// metric-id → bucket-start (unix seconds) → additive counter.
pub type TimeSeries = BTreeMap<i64, i64>;

/// A filter's time-series statistics: metric-id → time-series.
///
/// Conventionally metric `1` is "regular" matches and `2` is "error"
/// matches, but the core treats the metric id as an opaque small integer.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FilterStats {
    pub metrics: BTreeMap<u32, TimeSeries>,
}

impl FilterStats {
    /// True if there is not a single recorded counter.
    pub fn is_empty(&self) -> bool {
        self.metrics.values().all(|series| series.is_empty())
    }

    /// Add `delta` to `metric`'s `bucket` counter, creating both as needed.
    pub fn add(&mut self, metric: u32, bucket: i64, delta: i64) {
        *self.metrics.entry(metric).or_default().entry(bucket).or_insert(0) += delta;
    }

    /// Drop every bucket older than `cutoff` across all metrics. Returns
    /// true if anything was removed (the container became "dirty").
    pub fn retain_since(&mut self, cutoff: i64) -> bool {
        let mut dirty = false;
        for series in self.metrics.values_mut() {
            let before = series.len();
            series.retain(|bucket, _| *bucket >= cutoff);
            dirty |= series.len() != before;
        }
        dirty
    }
}

/// A detected anomaly against a filter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Outlier {
    pub filter_id: Uuid,
    pub timestamp: i64,
    pub score: f64,
    pub details: String,
}
