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

use crate::models::{CreateRecordRequest, MedicalRecord, RecordListQuery};
use crate::services::MedicalRecordService;

/// Resolves whose chart the record goes into and who authored it.
fn record_owner(user: &User, role: Role, request: &CreateRecordRequest) -> Result<(Uuid, Option<Uuid>), AppError> {
    match role {
        Role::Member => {
            let own_id = user_uuid(user)?;
            match request.member_id {
                Some(member_id) if member_id != own_id => Err(AppError::Forbidden(
                    "Members can only add records to their own history".to_string(),
                )),
                _ => Ok((own_id, None)),
            }
        }
        Role::Physician => {
            let member_id = request.member_id
                .ok_or_else(|| AppError::BadRequest("member_id is required".to_string()))?;
            Ok((member_id, Some(user_uuid(user)?)))
        }
        Role::Admin => {
            let member_id = request.member_id
                .ok_or_else(|| AppError::BadRequest("member_id is required".to_string()))?;
            Ok((member_id, None))
        }
    }
}

fn can_read(user: &User, record: &MedicalRecord) -> bool {
    user.is_admin() || user.is_physician() || record.is_owned_by(&user.id)
}

#[axum::debug_handler]
pub async fn create_record(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<MedicalRecord>), AppError> {
    let role = require_role(&user, &[Role::Member, Role::Physician])?;
    let (member_id, physician_id) = record_owner(&user, role, &request)?;

    let record = MedicalRecordService::new(&state)
        .create_record(member_id, physician_id, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[axum::debug_handler]
pub async fn get_member_records(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(member_id): Path<Uuid>,
    Query(query): Query<RecordListQuery>,
) -> Result<Json<Value>, AppError> {
    if !(user.is_admin() || user.is_physician() || user.id == member_id.to_string()) {
        return Err(AppError::Forbidden("Not authorized to view these records".to_string()));
    }

    let records = MedicalRecordService::new(&state)
        .list_records(member_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "records": records,
        "total": records.len()
    })))
}

#[axum::debug_handler]
pub async fn get_record(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<MedicalRecord>, AppError> {
    let record = MedicalRecordService::new(&state)
        .get_record(record_id, auth.token())
        .await?;

    if !can_read(&user, &record) {
        return Err(AppError::Forbidden("Not authorized to view this record".to_string()));
    }

    Ok(Json(record))
}

#[axum::debug_handler]
pub async fn delete_record(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(record_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let service = MedicalRecordService::new(&state);
    let record = service.get_record(record_id, auth.token()).await?;

    if !(user.is_admin() || record.is_owned_by(&user.id)) {
        return Err(AppError::Forbidden("Not authorized to delete this record".to_string()));
    }

    service.delete_record(&record, auth.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordType;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    fn request(member_id: Option<Uuid>) -> CreateRecordRequest {
        CreateRecordRequest {
            member_id,
            appointment_id: None,
            title: "Blood panel".to_string(),
            record_type: RecordType::LabResult,
            description: None,
            attachment: None,
        }
    }

    #[test]
    fn member_files_into_own_history() {
        let member = TestUser::member("ada@example.com").to_user();
        let own = user_uuid(&member).unwrap();

        assert_eq!(record_owner(&member, Role::Member, &request(None)).unwrap(), (own, None));
        assert_eq!(record_owner(&member, Role::Member, &request(Some(own))).unwrap(), (own, None));
        assert_matches!(
            record_owner(&member, Role::Member, &request(Some(Uuid::new_v4()))),
            Err(AppError::Forbidden(_))
        );
    }

    #[test]
    fn physician_is_recorded_as_author() {
        let physician = TestUser::physician("grace@example.com").to_user();
        let member_id = Uuid::new_v4();

        let (owner, author) = record_owner(&physician, Role::Physician, &request(Some(member_id))).unwrap();
        assert_eq!(owner, member_id);
        assert_eq!(author, Some(user_uuid(&physician).unwrap()));

        assert_matches!(
            record_owner(&physician, Role::Physician, &request(None)),
            Err(AppError::BadRequest(_))
        );
    }
}
