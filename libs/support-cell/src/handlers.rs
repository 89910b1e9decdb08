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
use shared_utils::roles::{require_role, require_self_or_admin, user_uuid};

use crate::models::{
    CreateReplyRequest, CreateTicketRequest, SupportTicket, TicketListQuery, TicketReply,
    UpdateTicketStatusRequest, UserRole,
};
use crate::services::SupportService;

async fn load_ticket(
    service: &SupportService,
    user: &User,
    ticket_id: Uuid,
    token: &str,
) -> Result<SupportTicket, AppError> {
    let ticket = service.get_ticket(ticket_id, token).await?;
    require_self_or_admin(user, &ticket.user_id.to_string(), "access this ticket")?;
    Ok(ticket)
}

#[axum::debug_handler]
pub async fn create_ticket(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<SupportTicket>), AppError> {
    let user_role = match require_role(&user, &[Role::Member, Role::Physician])? {
        Role::Member => UserRole::Member,
        Role::Physician => UserRole::Physician,
        Role::Admin => {
            return Err(AppError::Forbidden("Support staff cannot open tickets".to_string()))
        }
    };

    let ticket = SupportService::new(&state)
        .create_ticket(user_uuid(&user)?, user_role, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

#[axum::debug_handler]
pub async fn list_tickets(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<Value>, AppError> {
    let owner = if user.is_admin() { None } else { Some(user.id.as_str()) };

    let tickets = SupportService::new(&state)
        .list_tickets(owner, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "tickets": tickets,
        "total": tickets.len()
    })))
}

#[axum::debug_handler]
pub async fn get_ticket(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<SupportTicket>, AppError> {
    let service = SupportService::new(&state);
    let ticket = load_ticket(&service, &user, ticket_id, auth.token()).await?;
    Ok(Json(ticket))
}

#[axum::debug_handler]
pub async fn update_ticket_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<UpdateTicketStatusRequest>,
) -> Result<Json<SupportTicket>, AppError> {
    let service = SupportService::new(&state);
    let ticket = load_ticket(&service, &user, ticket_id, auth.token()).await?;

    let updated = service
        .update_status(&ticket, request.status, user.is_admin(), auth.token())
        .await?;

    Ok(Json(updated))
}

#[axum::debug_handler]
pub async fn add_reply(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<CreateReplyRequest>,
) -> Result<(StatusCode, Json<TicketReply>), AppError> {
    let service = SupportService::new(&state);
    let ticket = load_ticket(&service, &user, ticket_id, auth.token()).await?;

    let reply = service
        .add_reply(&ticket, user_uuid(&user)?, &request.body, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

#[axum::debug_handler]
pub async fn list_replies(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<TicketReply>>, AppError> {
    let service = SupportService::new(&state);
    let ticket = load_ticket(&service, &user, ticket_id, auth.token()).await?;

    Ok(Json(service.list_replies(&ticket, auth.token()).await?))
}
