use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn support_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/tickets", post(handlers::create_ticket).get(handlers::list_tickets))
        .route("/tickets/{ticket_id}", get(handlers::get_ticket))
        .route("/tickets/{ticket_id}/status", patch(handlers::update_ticket_status))
        .route("/tickets/{ticket_id}/replies", post(handlers::add_reply).get(handlers::list_replies))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
