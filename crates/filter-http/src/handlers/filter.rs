use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::dto::{CreateResponse, DeleteResponse, FilterDto, ListResponse};
use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateQuery {
    pub name: String,
    pub regex: String,
}

/// `POST /filter?name=...&regex=...`
///
/// `client_host` is not a query parameter: it is the creator's observed
/// socket address, matching the spec's "advisory, captured at create time"
/// description (§3.1).
pub async fn create(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(q): Query<CreateQuery>,
) -> Result<Json<CreateResponse>, ApiError> {
    let client_host = peer.to_string();
    let filter_id =
        tokio::task::spawn_blocking(move || state.manager.create(&q.name, &client_host, &q.regex))
            .await
            .expect("create task panicked")?;
    Ok(Json(CreateResponse { filter_id }))
}

/// `GET /filter`
pub async fn list(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let filters =
        tokio::task::spawn_blocking(move || state.manager.list()).await.expect("list task panicked")?;
    Ok(Json(ListResponse { filters: filters.into_iter().map(FilterDto::from).collect() }))
}

/// `DELETE /filter/:id`
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = tokio::task::spawn_blocking(move || state.manager.delete(id))
        .await
        .expect("delete task panicked")?;
    Ok(Json(DeleteResponse { deleted }))
}
