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

use messaging_cell::router::messaging_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn create_test_app(config: &TestConfig) -> Router {
    messaging_routes(config.to_arc())
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

fn conversation(id: &str, member_id: &str, physician_id: &str) -> Value {
    json!({
        "id": id,
        "member_id": member_id,
        "physician_id": physician_id,
        "created_at": "2024-01-01T00:00:00Z",
        "last_message_at": null
    })
}

fn message(conversation_id: &str, sender_id: &str, body: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "conversation_id": conversation_id,
        "sender_id": sender_id,
        "body": body,
        "read_at": null,
        "created_at": "2024-01-02T10:00:00Z"
    })
}

#[tokio::test]
async fn test_open_new_conversation() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let physician_id = Uuid::new_v4().to_string();
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .and(query_param("member_id", format!("eq.{}", member.id)))
        .and(query_param("physician_id", format!("eq.{}", physician_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/physicians"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::physician_response(&physician_id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            conversation(&conversation_id, &member.id, &physician_id)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("POST", "/conversations", &token, Some(json!({ "physician_id": physician_id }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], conversation_id);
}

#[tokio::test]
async fn test_open_existing_conversation_returns_it() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let physician = TestUser::physician("grace@example.com");
    let token = JwtTestUtils::create_test_token(&physician, &config.jwt_secret, Some(1));
    let member_id = Uuid::new_v4().to_string();
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &member_id, &physician.id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("POST", "/conversations", &token, Some(json!({ "member_id": member_id }))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], conversation_id);
}

#[tokio::test]
async fn test_open_conversation_requires_counterpart() {
    let config = TestConfig::default();
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));

    let response = create_test_app(&config)
        .oneshot(authed("POST", "/conversations", &token, Some(json!({}))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_participant_sends_message() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .and(query_param("id", format!("eq.{}", conversation_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &member.id, &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .and(body_partial_json(json!({ "body": "Is the rash contagious?", "sender_id": member.id })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            message(&conversation_id, &member.id, "Is the rash contagious?")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = authed(
        "POST",
        &format!("/conversations/{}/messages", conversation_id),
        &token,
        Some(json!({ "body": "  Is the rash contagious?  " })),
    );

    let response = create_test_app(&config).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_message_is_returned_when_conversation_stamp_fails() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .and(query_param("id", format!("eq.{}", conversation_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &member.id, &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    let sent = message(&conversation_id, &member.id, "Still itching");
    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([sent.clone()])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "upstream timeout" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = authed(
        "POST",
        &format!("/conversations/{}/messages", conversation_id),
        &token,
        Some(json!({ "body": "Still itching" })),
    );

    let response = create_test_app(&config).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["id"], sent["id"]);
}

#[tokio::test]
async fn test_blank_and_overlong_messages_are_rejected() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &member.id, &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    for body in ["   ".to_string(), "x".repeat(4001)] {
        let request = authed(
            "POST",
            &format!("/conversations/{}/messages", conversation_id),
            &token,
            Some(json!({ "body": body })),
        );

        let response = create_test_app(&config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_outsider_cannot_read_messages() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let outsider = TestUser::member("eve@example.com");
    let token = JwtTestUtils::create_test_token(&outsider, &config.jwt_secret, Some(1));
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &Uuid::new_v4().to_string(), &Uuid::new_v4().to_string())
        ])))
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("GET", &format!("/conversations/{}/messages", conversation_id), &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_messages_are_returned_oldest_first() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let physician_id = Uuid::new_v4().to_string();
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &member.id, &physician_id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            message(&conversation_id, &physician_id, "second"),
            message(&conversation_id, &member.id, "first"),
        ])))
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("GET", &format!("/conversations/{}/messages", conversation_id), &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["body"], "first");
    assert_eq!(json[1]["body"], "second");
}

#[tokio::test]
async fn test_mark_read_only_touches_incoming_messages() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let member = TestUser::member("ada@example.com");
    let token = JwtTestUtils::create_test_token(&member, &config.jwt_secret, Some(1));
    let physician_id = Uuid::new_v4().to_string();
    let conversation_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            conversation(&conversation_id, &member.id, &physician_id)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/messages"))
        .and(query_param("sender_id", format!("neq.{}", member.id)))
        .and(query_param("read_at", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            message(&conversation_id, &physician_id, "hello"),
            message(&conversation_id, &physician_id, "are you there?"),
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = create_test_app(&config)
        .oneshot(authed("POST", &format!("/conversations/{}/read", conversation_id), &token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["marked_read"], 2);
}
