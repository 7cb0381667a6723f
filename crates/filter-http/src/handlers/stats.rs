use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::dto::{IngestBatchResponse, StatsResponse};
use crate::error::ApiError;
use crate::gzip::maybe_inflate;
use crate::AppState;

/// `GET /filter/:id/stats`
pub async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = tokio::task::spawn_blocking(move || state.manager.get_stats(id))
        .await
        .expect("get_stats task panicked")?;
    Ok(Json(StatsResponse::from(stats)))
}

/// `PUT /stats/filters`
///
/// Body is JSON `{ "f=<id>_m=<m>_b=<b>": count, ... }`, optionally gzip.
/// Unknown filters or malformed keys are logged and skipped by the core;
/// the response reports how many entries were accepted.
pub async fn ingest_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<IngestBatchResponse>, ApiError> {
    let inflated = maybe_inflate(&headers, &body)?;
    let entries: HashMap<String, i64> = serde_json::from_slice(&inflated)
        .map_err(|e| ApiError::BadRequest(format!("malformed stats batch body: {e}")))?;

    let accepted = tokio::task::spawn_blocking(move || state.manager.ingest_batch(&entries))
        .await
        .expect("ingest_batch task panicked")?;
    Ok(Json(IngestBatchResponse { accepted }))
}
