use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn physician_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/search", get(handlers::search_physicians))
        .route("/{physician_id}", get(handlers::get_physician))
        .route("/{physician_id}/available-slots", get(handlers::get_available_slots));

    let protected_routes = Router::new()
        .route("/", post(handlers::create_physician))
        .route("/{physician_id}", put(handlers::update_physician))
        .route("/{physician_id}/slots", get(handlers::list_slots).post(handlers::create_slot))
        .route("/{physician_id}/slots/{slot_id}", put(handlers::update_slot).delete(handlers::delete_slot))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
