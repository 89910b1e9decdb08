use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::{NaiveDate, Utc};
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::roles::{require_role, require_self_or_admin, user_uuid};

use crate::models::{
    AvailabilityResponse, CreatePhysicianRequest, CreateSlotRequest,
    PhysicianSearchFilters, UpdatePhysicianRequest, UpdateSlotRequest,
};
use crate::services::{AvailabilityService, PhysicianService, ScheduleService};

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn search_physicians(
    State(state): State<Arc<AppConfig>>,
    Query(filters): Query<PhysicianSearchFilters>,
) -> Result<Json<Value>, AppError> {
    let physician_service = PhysicianService::new(&state);

    let physicians = physician_service.search_physicians(filters, Utc::now(), None).await?;

    Ok(Json(json!({
        "total": physicians.len(),
        "physicians": physicians,
    })))
}

#[axum::debug_handler]
pub async fn get_physician(
    State(state): State<Arc<AppConfig>>,
    Path(physician_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let physician_service = PhysicianService::new(&state);

    let physician = physician_service.get_physician(physician_id, None).await?;

    Ok(Json(json!(physician)))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(physician_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let physician = PhysicianService::new(&state)
        .get_physician(physician_id, None)
        .await?;

    let available_slots = AvailabilityService::new(&state)
        .get_available_slots(physician_id, query.date, Utc::now(), None)
        .await?;

    Ok(Json(AvailabilityResponse {
        physician_id: physician.id,
        date: query.date,
        consultation_duration_minutes: physician.consultation_duration_minutes,
        available_slots,
    }))
}

// ==============================================================================
// PROTECTED PROFILE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_physician(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePhysicianRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_role(&user, &[Role::Physician])?;
    let physician_id = user_uuid(&user)?;

    let physician = PhysicianService::new(&state)
        .create_physician(physician_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(physician))))
}

#[axum::debug_handler]
pub async fn update_physician(
    State(state): State<Arc<AppConfig>>,
    Path(physician_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePhysicianRequest>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &physician_id.to_string(), "update this physician profile")?;

    let physician = PhysicianService::new(&state)
        .update_physician(physician_id, request, auth.token())
        .await?;

    Ok(Json(json!(physician)))
}

// ==============================================================================
// PROTECTED SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<AppConfig>>,
    Path(physician_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &physician_id.to_string(), "view this schedule")?;

    let slots = ScheduleService::new(&state)
        .list_slots(physician_id, auth.token())
        .await?;

    Ok(Json(json!({
        "physician_id": physician_id,
        "total": slots.len(),
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppConfig>>,
    Path(physician_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_self_or_admin(&user, &physician_id.to_string(), "manage this schedule")?;

    let slot = ScheduleService::new(&state)
        .create_slot(physician_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(json!(slot))))
}

#[axum::debug_handler]
pub async fn update_slot(
    State(state): State<Arc<AppConfig>>,
    Path((physician_id, slot_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &physician_id.to_string(), "manage this schedule")?;

    let slot = ScheduleService::new(&state)
        .update_slot(physician_id, slot_id, request, auth.token())
        .await?;

    Ok(Json(json!(slot)))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppConfig>>,
    Path((physician_id, slot_id)): Path<(Uuid, Uuid)>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    require_self_or_admin(&user, &physician_id.to_string(), "manage this schedule")?;

    ScheduleService::new(&state)
        .delete_slot(physician_id, slot_id, auth.token())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
