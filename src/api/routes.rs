use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/indexes", get(handlers::list_indexes))
        .route("/indexes/status", get(handlers::index_status))
        .route("/_internal/health", get(handlers::health));

    if state.config.server.allow_apply {
        tracing::warn!("ALLOW_APPLY is set, POST /indexes/apply can modify the collection");
        router = router.route("/indexes/apply", post(handlers::apply_indexes));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
