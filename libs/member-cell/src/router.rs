use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn member_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_member))
        .route("/me", get(handlers::get_my_profile))
        .route("/{member_id}", get(handlers::get_member).put(handlers::update_member))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
