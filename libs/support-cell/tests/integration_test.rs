use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{Mock, MockServer, ResponseTemplate};
use wiremock::matchers::{body_partial_json, method, path, query_param};

use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use support_cell::router::support_routes;

fn create_test_app(config: &TestConfig) -> Router {
    support_routes(config.to_arc())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token));

    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn ticket(id: &str, user_id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "user_role": "member",
        "subject": "Cannot join video call",
        "description": "The call page stays blank",
        "category": "technical",
        "status": status,
        "created_at": "2024-06-01T08:00:00Z",
        "updated_at": "2024-06-01T08:00:00Z"
    })
}

async fn mock_ticket(server: &MockServer, id: &str, user_id: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/support_tickets"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([ticket(id, user_id, status)])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_member_opens_ticket() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/support_tickets"))
        .and(body_partial_json(json!({
            "user_id": member.id,
            "user_role": "member",
            "status": "open",
            "subject": "Cannot join video call"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            ticket(&ticket_id, &member.id, "open")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = json!({
        "subject": " Cannot join video call ",
        "description": "The call page stays blank",
        "category": "technical"
    });

    let response = create_test_app(&config)
        .oneshot(authed("POST", "/tickets", &token, Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["status"], "open");
}

#[tokio::test]
async fn test_blank_subject_is_rejected() {
    let config = TestConfig::default();
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));

    let body = json!({ "subject": "   ", "description": "x", "category": "billing" });
    let response = create_test_app(&config)
        .oneshot(authed("POST", "/tickets", &token, Some(body)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_users_only_list_their_own_tickets() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let physician = TestUser::physician("grace@example.com");
    let token = JwtTestUtils::create_test_token(&physician, &config.jwt_secret, Some(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/support_tickets"))
        .and(query_param("user_id", format!("eq.{}", physician.id)))
        .and(query_param("status", "eq.in_progress"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("GET", "/tickets?status=in_progress", &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 0);
}

#[tokio::test]
async fn test_other_users_ticket_is_forbidden() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("eve@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    mock_ticket(&mock_server, &ticket_id, &Uuid::new_v4().to_string(), "open").await;

    let response = create_test_app(&config)
        .oneshot(authed("GET", &format!("/tickets/{}", ticket_id), &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_author_reopens_resolved_ticket() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    mock_ticket(&mock_server, &ticket_id, &member.id, "resolved").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/support_tickets"))
        .and(query_param("status", "eq.resolved"))
        .and(body_partial_json(json!({ "status": "open" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            ticket(&ticket_id, &member.id, "open")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("PATCH", &format!("/tickets/{}/status", ticket_id), &token, Some(json!({ "status": "open" }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "open");
}

#[tokio::test]
async fn test_author_cannot_resolve_own_ticket() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    mock_ticket(&mock_server, &ticket_id, &member.id, "open").await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("PATCH", &format!("/tickets/{}/status", ticket_id), &token, Some(json!({ "status": "resolved" }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_closed_ticket_cannot_be_reopened() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let admin = TestUser::admin("support@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    mock_ticket(&mock_server, &ticket_id, &Uuid::new_v4().to_string(), "closed").await;

    let response = create_test_app(&config)
        .oneshot(authed("PATCH", &format!("/tickets/{}/status", ticket_id), &token, Some(json!({ "status": "open" }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_staff_reply_touches_ticket() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let admin = TestUser::admin("support@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    mock_ticket(&mock_server, &ticket_id, &Uuid::new_v4().to_string(), "in_progress").await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/ticket_replies"))
        .and(body_partial_json(json!({ "author_id": admin.id, "body": "Please try another browser." })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "ticket_id": ticket_id,
            "author_id": admin.id,
            "body": "Please try another browser.",
            "created_at": "2024-06-01T09:00:00Z"
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/support_tickets"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed(
            "POST",
            &format!("/tickets/{}/replies", ticket_id),
            &token,
            Some(json!({ "body": "Please try another browser." })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_reply_to_closed_ticket_is_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let ticket_id = Uuid::new_v4().to_string();

    mock_ticket(&mock_server, &ticket_id, &member.id, "closed").await;

    let response = create_test_app(&config)
        .oneshot(authed(
            "POST",
            &format!("/tickets/{}/replies", ticket_id),
            &token,
            Some(json!({ "body": "Still broken" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
