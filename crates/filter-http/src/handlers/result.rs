use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::dto::{AddResultsResponse, ResultResponse};
use crate::error::ApiError;
use crate::gzip::maybe_inflate;
use crate::AppState;

#[derive(Deserialize)]
pub struct ResultQuery {
    #[serde(default)]
    pub result_offset: u64,
}

/// `GET /filter/:id/result?result_offset=N`
pub async fn get_since(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<ResultQuery>,
) -> Result<Json<ResultResponse>, ApiError> {
    let (results, result_offset) =
        tokio::task::spawn_blocking(move || state.manager.get_since(id, q.result_offset))
            .await
            .expect("get_since task panicked");
    Ok(Json(ResultResponse { results, result_offset }))
}

/// `PUT /filter/:id/result`
///
/// Body is newline-delimited text, optionally gzip-compressed. A batch
/// larger than the configured cap has its excess lines dropped with a log
/// warning rather than failing the request (spec §6).
pub async fn add_results(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<AddResultsResponse>, ApiError> {
    let inflated = maybe_inflate(&headers, &body)?;
    let text = String::from_utf8(inflated)
        .map_err(|e| ApiError::BadRequest(format!("result body is not utf-8: {e}")))?;

    let cap = state.config.max_msg_batch;
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    if lines.len() > cap {
        tracing::warn!(
            filter_id = %id,
            submitted = lines.len(),
            cap,
            "dropping excess lines over the per-request batch cap"
        );
        lines.truncate(cap);
    }

    let accepted = lines.len();
    tokio::task::spawn_blocking(move || state.manager.add_results(id, lines))
        .await
        .expect("add_results task panicked");

    Ok(Json(AddResultsResponse { accepted }))
}
