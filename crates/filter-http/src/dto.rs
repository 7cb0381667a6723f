//! Wire-shape types for request/response bodies. Kept separate from
//! [`lsd_core::model`] so the core crate's types never need `#[serde]`
//! attributes tailored to one particular transport's JSON conventions (the
//! spec calls for stats keys rendered as decimal strings, which a plain
//! `BTreeMap<u32, _>` does not do by default).

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use lsd_core::{Filter, FilterStats};

#[derive(Serialize)]
pub struct FilterDto {
    pub id: Uuid,
    pub name: String,
    pub regex: String,
    pub client_host: String,
}

impl From<Filter> for FilterDto {
    fn from(f: Filter) -> Self {
        Self { id: f.id, name: f.name, regex: f.regex, client_host: f.client_host }
    }
}

#[derive(Serialize)]
pub struct ListResponse {
    pub filters: Vec<FilterDto>,
}

#[derive(Serialize)]
pub struct CreateResponse {
    pub filter_id: Uuid,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Serialize)]
pub struct ResultResponse {
    pub results: Vec<String>,
    pub result_offset: u64,
}

#[derive(Serialize)]
pub struct AddResultsResponse {
    pub accepted: usize,
}

/// Metric ids and bucket keys rendered as decimal strings, per spec §6.
#[derive(Serialize)]
pub struct StatsResponse {
    pub metrics: BTreeMap<String, BTreeMap<String, i64>>,
}

impl From<FilterStats> for StatsResponse {
    fn from(stats: FilterStats) -> Self {
        let metrics = stats
            .metrics
            .into_iter()
            .map(|(metric, series)| {
                let series = series.into_iter().map(|(bucket, count)| (bucket.to_string(), count)).collect();
                (metric.to_string(), series)
            })
            .collect();
        Self { metrics }
    }
}

#[derive(Serialize)]
pub struct IngestBatchResponse {
    pub accepted: usize,
}

#[derive(Serialize)]
pub struct OutlierResponse {
    pub outlier_id: Uuid,
}

#[derive(Serialize)]
pub struct TruncateResponse {
    pub truncated: bool,
}
