use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use skillswap_ledger::{RecordSource, RecordWriter};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::guard::{WriteGuard, guard_writes};
use crate::handlers::{
    compute_matches_handler, health_handler, list_participants_handler, match_with_handler,
    matches_handler, participant_handler, recorded_matches_handler, refresh_handler,
    register_handler, status_handler, update_handler,
};
use crate::server::AppState;

/// Reads are open; every write route sits behind `guard` and the body limit.
pub(crate) fn build_router<S>(
    state: AppState<S>,
    guard: Arc<WriteGuard>,
    max_body_size: usize,
) -> Router
where
    S: RecordSource + RecordWriter + 'static,
{
    let writes = Router::new()
        .route(
            "/profile",
            post(register_handler::<S>).patch(update_handler::<S>),
        )
        .route("/matches", post(compute_matches_handler::<S>))
        .route("/matches/{id}", post(match_with_handler::<S>))
        .route("/refresh", post(refresh_handler::<S>))
        .layer(middleware::from_fn_with_state(guard, guard_writes))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/status", get(status_handler::<S>))
        .route("/participants", get(list_participants_handler::<S>))
        .route("/participants/{id}", get(participant_handler::<S>))
        .route("/participants/{id}/matches", get(matches_handler::<S>))
        .route(
            "/participants/{id}/matches/recorded",
            get(recorded_matches_handler::<S>),
        )
        .merge(writes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
