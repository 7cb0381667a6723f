//! Thin `axum` adapter (C9) binding the endpoints in spec §6 to
//! [`lsd_core::FilterManager`].
//!
//! This layer carries no business logic: every handler parses its
//! path/query parameters, optionally inflates a gzip body, calls straight
//! through to the manager on a blocking-pool thread (so a slow KV
//! transaction never stalls the async reactor), and translates the result
//! into a JSON envelope. State is a single `Arc<FilterManager>`, handed to
//! the router at startup and cloned into every handler via axum's `State`
//! extractor.

mod dto;
mod error;
mod gzip;
mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use lsd_core::FilterManager;
use tower_http::trace::TraceLayer;

/// Request-shaping settings that live at the HTTP boundary rather than in
/// the core contract (spec §6: "mutable at the supervisor boundary but not
/// inside the core contract").
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Lines beyond this count in a single `PUT .../result` are dropped
    /// (with a warning), not rejected.
    pub max_msg_batch: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { max_msg_batch: 10_000 }
    }
}

/// Shared state handed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<FilterManager>,
    pub config: HttpConfig,
}

/// Build the full router for the supervisor's filter-manager endpoints.
/// The caller is responsible for binding and serving it (see the
/// `lsd-supervisor` binary), and for layering auth in front of
/// `/admin/*` routes if the deployment requires it — this crate only
/// reserves the prefix, it does not enforce anything under it.
pub fn router(manager: Arc<FilterManager>, config: HttpConfig) -> Router {
    Router::new()
        .route("/filter", post(handlers::filter::create).get(handlers::filter::list))
        .route("/filter/{id}", delete(handlers::filter::delete))
        .route("/filter/{id}/result", get(handlers::result::get_since).put(handlers::result::add_results))
        .route("/filter/{id}/stats", get(handlers::stats::get_stats))
        .route("/stats/filters", put(handlers::stats::ingest_batch))
        .route("/filter/{id}/outlier", post(handlers::outlier::add_outlier))
        .route("/admin/truncate/outliers", delete(handlers::outlier::truncate_all))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager, config })
}
