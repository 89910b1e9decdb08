use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::roles::{require_role, user_uuid};

use crate::models::{
    Conversation, Message, MessageListQuery, OpenConversationRequest, SendMessageRequest,
};
use crate::services::MessagingService;

/// Works out the (member, physician) pair from the caller and the request.
fn conversation_pair(user: &User, role: Role, request: &OpenConversationRequest) -> Result<(Uuid, Uuid), AppError> {
    let missing = |field: &str| AppError::BadRequest(format!("{} is required", field));

    match role {
        Role::Member => Ok((
            user_uuid(user)?,
            request.physician_id.ok_or_else(|| missing("physician_id"))?,
        )),
        Role::Physician => Ok((
            request.member_id.ok_or_else(|| missing("member_id"))?,
            user_uuid(user)?,
        )),
        Role::Admin => Ok((
            request.member_id.ok_or_else(|| missing("member_id"))?,
            request.physician_id.ok_or_else(|| missing("physician_id"))?,
        )),
    }
}

#[axum::debug_handler]
pub async fn open_conversation(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<OpenConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), AppError> {
    let role = require_role(&user, &[Role::Member, Role::Physician])?;
    let (member_id, physician_id) = conversation_pair(&user, role, &request)?;

    let (conversation, created) = MessagingService::new(&state)
        .open_conversation(member_id, physician_id, auth.token())
        .await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation)))
}

#[axum::debug_handler]
pub async fn list_conversations(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let conversations = MessagingService::new(&state)
        .list_conversations(&user.id, auth.token())
        .await?;

    Ok(Json(json!({
        "conversations": conversations,
        "total": conversations.len()
    })))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let service = MessagingService::new(&state);

    let conversation = service.get_conversation_for(conversation_id, &user.id, auth.token()).await?;
    let messages = service.list_messages(&conversation, &query, auth.token()).await?;

    Ok(Json(messages))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let service = MessagingService::new(&state);

    let conversation = service.get_conversation_for(conversation_id, &user.id, auth.token()).await?;
    let message = service
        .send_message(&conversation, user_uuid(&user)?, &request.body, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

#[axum::debug_handler]
pub async fn mark_conversation_read(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = MessagingService::new(&state);

    let conversation = service.get_conversation_for(conversation_id, &user.id, auth.token()).await?;
    let updated = service.mark_read(&conversation, &user.id, auth.token()).await?;

    Ok(Json(json!({ "marked_read": updated })))
}
