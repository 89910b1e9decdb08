use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::roles::{require_role, require_self_or_admin};

use crate::models::{CreateMemberRequest, Member, UpdateMemberRequest};
use crate::services::MemberService;

#[axum::debug_handler]
pub async fn create_member(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<Member>), AppError> {
    require_role(&user, &[Role::Member])?;

    let member = MemberService::new(&state)
        .create_member(&user.id, request, Utc::now().date_naive(), auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(member)))
}

#[axum::debug_handler]
pub async fn get_my_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Member>, AppError> {
    let member = MemberService::new(&state)
        .get_member(&user.id, auth.token())
        .await?;

    Ok(Json(member))
}

/// Members see themselves; physicians and admins may look members up, with
/// row-level security narrowing physicians to their own patients.
#[axum::debug_handler]
pub async fn get_member(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(member_id): Path<String>,
) -> Result<Json<Member>, AppError> {
    if !user.is_physician() {
        require_self_or_admin(&user, &member_id, "view this member profile")?;
    }

    let member = MemberService::new(&state)
        .get_member(&member_id, auth.token())
        .await?;

    Ok(Json(member))
}

#[axum::debug_handler]
pub async fn update_member(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(member_id): Path<String>,
    Json(request): Json<UpdateMemberRequest>,
) -> Result<Json<Member>, AppError> {
    require_self_or_admin(&user, &member_id, "update this member profile")?;

    let member = MemberService::new(&state)
        .update_member(&member_id, request, Utc::now().date_naive(), auth.token())
        .await?;

    Ok(Json(member))
}
