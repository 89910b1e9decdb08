use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn records_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_record))
        .route("/member/{member_id}", get(handlers::get_member_records))
        .route("/{record_id}", get(handlers::get_record).delete(handlers::delete_record))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
