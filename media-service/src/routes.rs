//! Route assembly for the media indexing and retrieval engine (§6).

use axum::routing::{delete, get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the full router. Everything lives under `/api/v1` (§6), with
/// `/auth/token` and `/ping`/`/health` exempt from the bearer-auth layer —
/// `route_layer` only wraps the routes registered before it's called, so
/// the exempt routes are merged in afterwards rather than listed alongside
/// the protected ones. `/metrics` sits outside `/api/v1` entirely, on its
/// own state.
pub fn create_router(state: Arc<AppState>, prometheus_handle: PrometheusHandle) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let protected = Router::new()
        .route("/media/upload", post(handlers::upload::upload))
        .route("/media/list", get(handlers::media::list))
        .route("/media/{gmid}", get(handlers::media::detail).delete(handlers::media::delete))
        .route("/media/{gmid}/description", put(handlers::media::update_description))
        .route("/search/text", post(handlers::search::text))
        .route("/search/by-image", post(handlers::search::by_image))
        .route("/search/similar-by-file", post(handlers::search::similar_by_file))
        .route("/search/stats", get(handlers::search::stats))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), crate::auth::require_bearer_token));

    let exempt = Router::new()
        .route("/ping", get(handlers::health::ping))
        .route("/health", get(handlers::health::health))
        .route("/auth/token", post(handlers::auth::token));

    let api_v1 = protected.merge(exempt);

    let metrics = Router::new().route("/metrics", get(crate::metrics::scrape)).with_state(prometheus_handle);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(metrics)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
