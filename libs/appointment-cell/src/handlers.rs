// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::roles::{require_role, require_self_or_admin, user_uuid};

use crate::models::{
    Appointment, AppointmentDetail, AppointmentListQuery, BookAppointmentRequest,
    CancelAppointmentRequest, CreatePaymentRequest, Payment, RescheduleAppointmentRequest,
    UpdatePaymentStatusRequest, UpsertDetailRequest,
};
use crate::services::{AppointmentBookingService, AppointmentDetailService, PaymentService};

fn authorize_participant(user: &User, appointment: &Appointment, action: &str) -> Result<(), AppError> {
    if user.is_admin() || appointment.involves(&user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Not authorized to {}", action)))
    }
}

/// Resolves whose appointment is being booked from the caller's role.
fn booking_member_id(user: &User, role: Role, request: &BookAppointmentRequest) -> Result<Uuid, AppError> {
    match role {
        Role::Member => {
            let own_id = user_uuid(user)?;
            match request.member_id {
                Some(member_id) if member_id != own_id => Err(AppError::Forbidden(
                    "Members can only book appointments for themselves".to_string(),
                )),
                _ => Ok(own_id),
            }
        }
        Role::Physician => {
            if request.physician_id != user_uuid(user)? {
                return Err(AppError::Forbidden(
                    "Physicians can only book into their own schedule".to_string(),
                ));
            }
            request.member_id
                .ok_or_else(|| AppError::BadRequest("member_id is required".to_string()))
        }
        Role::Admin => request.member_id
            .ok_or_else(|| AppError::BadRequest("member_id is required".to_string())),
    }
}

// ==============================================================================
// BOOKING & LIFECYCLE
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let role = require_role(&user, &[Role::Member, Role::Physician])?;
    let member_id = booking_member_id(&user, role, &request)?;

    let appointment = AppointmentBookingService::new(&state)
        .book_appointment(member_id, request, Utc::now(), auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(appointment)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;

    authorize_participant(&user, &appointment, "view this appointment")?;

    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn get_member_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(member_id): Path<Uuid>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &member_id.to_string(), "view these appointments")?;

    let appointments = AppointmentBookingService::new(&state)
        .list_member_appointments(member_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_physician_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(physician_id): Path<Uuid>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&user, &physician_id.to_string(), "view these appointments")?;

    let appointments = AppointmentBookingService::new(&state)
        .list_physician_appointments(physician_id, &query, auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, auth.token()).await?;
    authorize_participant(&user, &appointment, "reschedule this appointment")?;

    let rescheduled = booking_service
        .reschedule_appointment(appointment_id, request, Utc::now(), auth.token())
        .await?;

    Ok(Json(rescheduled))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, auth.token()).await?;
    authorize_participant(&user, &appointment, "cancel this appointment")?;

    let cancelled = booking_service
        .cancel_appointment(appointment_id, &request.reason, user_uuid(&user)?, auth.token())
        .await?;

    Ok(Json(cancelled))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service.get_appointment(appointment_id, auth.token()).await?;
    require_self_or_admin(&user, &appointment.physician_id.to_string(), "complete this appointment")?;

    let completed = booking_service
        .complete_appointment(appointment_id, Utc::now(), auth.token())
        .await?;

    Ok(Json(completed))
}

// ==============================================================================
// DETAILS & PAYMENTS
// ==============================================================================

#[axum::debug_handler]
pub async fn upsert_appointment_details(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpsertDetailRequest>,
) -> Result<Json<AppointmentDetail>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;
    authorize_participant(&user, &appointment, "edit this appointment")?;

    let detail = AppointmentDetailService::new(&state)
        .upsert_detail(appointment_id, request, auth.token())
        .await?;

    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn get_appointment_details(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<AppointmentDetail>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;
    authorize_participant(&user, &appointment, "view this appointment")?;

    let detail = AppointmentDetailService::new(&state)
        .get_detail(appointment_id, auth.token())
        .await?;

    Ok(Json(detail))
}

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;
    require_self_or_admin(&user, &appointment.member_id.to_string(), "pay for this appointment")?;

    let payment = PaymentService::new(&state)
        .record_payment(&appointment, request, auth.token())
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;
    authorize_participant(&user, &appointment, "view this payment")?;

    let payment = PaymentService::new(&state)
        .get_payment(appointment_id, auth.token())
        .await?;

    Ok(Json(payment))
}

#[axum::debug_handler]
pub async fn update_payment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<Payment>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(appointment_id, auth.token())
        .await?;
    require_self_or_admin(&user, &appointment.member_id.to_string(), "update this payment")?;

    let payment = PaymentService::new(&state)
        .update_payment_status(appointment_id, request, auth.token())
        .await?;

    Ok(Json(payment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    fn request(physician_id: Uuid, member_id: Option<Uuid>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            physician_id,
            start_time: Utc::now(),
            member_id,
        }
    }

    #[test]
    fn member_books_for_self() {
        let member = TestUser::member("m@example.com").to_user();
        let own = user_uuid(&member).unwrap();

        assert_eq!(booking_member_id(&member, Role::Member, &request(Uuid::new_v4(), None)).unwrap(), own);
        assert_eq!(booking_member_id(&member, Role::Member, &request(Uuid::new_v4(), Some(own))).unwrap(), own);
        assert_matches!(
            booking_member_id(&member, Role::Member, &request(Uuid::new_v4(), Some(Uuid::new_v4()))),
            Err(AppError::Forbidden(_))
        );
    }

    #[test]
    fn physician_books_own_schedule_for_named_member() {
        let physician = TestUser::physician("p@example.com").to_user();
        let own = user_uuid(&physician).unwrap();
        let member_id = Uuid::new_v4();

        assert_eq!(booking_member_id(&physician, Role::Physician, &request(own, Some(member_id))).unwrap(), member_id);
        assert_matches!(booking_member_id(&physician, Role::Physician, &request(own, None)), Err(AppError::BadRequest(_)));
        assert_matches!(
            booking_member_id(&physician, Role::Physician, &request(Uuid::new_v4(), Some(member_id))),
            Err(AppError::Forbidden(_))
        );
    }
}
