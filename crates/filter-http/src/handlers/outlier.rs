use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::dto::{OutlierResponse, TruncateResponse};
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct OutlierQuery {
    pub timestamp: i64,
    pub score: f64,
}

/// `POST /filter/:id/outlier?timestamp=...&score=...`, body is opaque
/// `details` text.
pub async fn add_outlier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<OutlierQuery>,
    body: String,
) -> Result<Json<OutlierResponse>, ApiError> {
    let outlier_id =
        tokio::task::spawn_blocking(move || state.manager.add_outlier(id, q.timestamp, q.score, &body))
            .await
            .expect("add_outlier task panicked")?;
    Ok(Json(OutlierResponse { outlier_id }))
}

/// `DELETE /admin/truncate/outliers`
///
/// Admin-gated at the edge (reverse proxy / auth middleware supplied by the
/// caller); this route itself performs no authorization check.
pub async fn truncate_all(State(state): State<AppState>) -> Result<Json<TruncateResponse>, ApiError> {
    tokio::task::spawn_blocking(move || state.manager.truncate_outliers())
        .await
        .expect("truncate_outliers task panicked")?;
    Ok(Json(TruncateResponse { truncated: true }))
}
