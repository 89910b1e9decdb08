use std::sync::Arc;

use axum::{
    extract::State,
    Json,
    Router,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use auth_cell::router::auth_routes;
use medical_records_cell::router::records_routes;
use member_cell::router::member_routes;
use messaging_cell::router::messaging_routes;
use physician_cell::router::physician_routes;
use shared_config::AppConfig;
use support_cell::router::support_routes;

async fn health(State(state): State<Arc<AppConfig>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "configured": state.is_configured()
    }))
}

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Telehealth API is running!" }))
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/auth", auth_routes(state.clone()))
        .nest("/physicians", physician_routes(state.clone()))
        .nest("/members", member_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/messages", messaging_routes(state.clone()))
        .nest("/records", records_routes(state.clone()))
        .nest("/support", support_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_reports_configuration() {
        let app = create_router(TestConfig::default().to_arc());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["configured"], true);
    }

    #[tokio::test]
    async fn protected_cells_require_a_token() {
        let app = create_router(TestConfig::default().to_arc());

        for uri in ["/members/me", "/messages/conversations", "/support/tickets"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }
}
