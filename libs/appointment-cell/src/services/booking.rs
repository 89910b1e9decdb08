// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use physician_cell::models::Physician;
use physician_cell::services::PhysicianService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_utils::validation::clean_text;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus,
    BookAppointmentRequest, RescheduleAppointmentRequest, DOUBLE_BOOKING_REASON,
};
use crate::services::conflict::{fits_schedule, overlapping_rival, ConflictDetectionService};
use crate::services::lifecycle::AppointmentLifecycleService;

const DEFAULT_LIST_LIMIT: i32 = 50;
const MAX_LIST_LIMIT: i32 = 200;
const MAX_REASON_LEN: usize = 500;

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    physicians: PhysicianService,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            physicians: PhysicianService::new(config),
            conflict_service: ConflictDetectionService::new(config),
            lifecycle_service: AppointmentLifecycleService::new(),
        }
    }

    /// Books `request.start_time` with the physician for `member_id`.
    ///
    /// The end is derived from the physician's consultation length. The
    /// interval must sit inside an offered window and clear every scheduled
    /// appointment, both before the insert and again after it: when the
    /// re-read finds any overlapping scheduled booking, the new row is
    /// cancelled and `DoubleBooking` is returned.
    pub async fn book_appointment(
        &self,
        member_id: Uuid,
        request: BookAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for member {} with physician {} at {}",
              member_id, request.physician_id, request.start_time);

        self.lifecycle_service.validate_start_in_future(request.start_time, now)?;

        let physician = self.bookable_physician(request.physician_id, auth_token).await?;
        let end_time = request.start_time + physician.consultation_duration();

        self.ensure_slot_free(physician.id, request.start_time, end_time, None, auth_token).await?;

        let appointment = self.create_appointment_record(
            member_id,
            physician.id,
            request.start_time,
            end_time,
            auth_token,
        ).await?;

        self.verify_no_double_booking(&appointment, auth_token).await?;

        info!("Appointment {} booked with physician {} from {} to {}",
              appointment.id, physician.id, appointment.start_time, appointment.end_time);
        Ok(appointment)
    }

    /// Moves a scheduled appointment, keeping the physician's consultation length.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment {} to {}", appointment_id, request.new_start_time);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_reschedulable(&current)?;
        self.lifecycle_service.validate_start_in_future(request.new_start_time, now)?;

        let physician = self.bookable_physician(current.physician_id, auth_token).await?;
        let new_end_time = request.new_start_time + physician.consultation_duration();

        self.ensure_slot_free(
            physician.id,
            request.new_start_time,
            new_end_time,
            Some(current.id),
            auth_token,
        ).await?;

        let updated = self.patch_scheduled(
            current.id,
            times_update(request.new_start_time, new_end_time),
            AppointmentStatus::Scheduled,
            auth_token,
        ).await?;

        let overlapping = self.conflict_service.check_conflicts(
            updated.physician_id,
            updated.start_time,
            updated.end_time,
            Some(updated.id),
            auth_token,
        ).await?;

        if let Some(rival) = overlapping_rival(updated.id, &overlapping) {
            warn!("Reschedule of {} collided with appointment {}, restoring previous time",
                  updated.id, rival.id);
            self.patch_scheduled(
                current.id,
                times_update(current.start_time, current.end_time),
                AppointmentStatus::Scheduled,
                auth_token,
            ).await?;
            return Err(AppointmentError::DoubleBooking);
        }

        info!("Appointment {} rescheduled to {} - {}", updated.id, updated.start_time, updated.end_time);
        Ok(updated)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: &str,
        cancelled_by: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let reason = clean_text(reason, "Cancellation reason", MAX_REASON_LEN)
            .map_err(AppointmentError::Validation)?;

        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_status_transition(current.status, AppointmentStatus::Cancelled)?;

        let cancelled = self.patch_scheduled(
            current.id,
            cancellation_update(&reason, Some(cancelled_by)),
            AppointmentStatus::Cancelled,
            auth_token,
        ).await?;

        info!("Appointment {} cancelled by {}", appointment_id, cancelled_by);
        Ok(cancelled)
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        self.lifecycle_service.validate_completion(&current, now)?;

        let completed = self.patch_scheduled(
            current.id,
            json!({
                "status": AppointmentStatus::Completed.to_string(),
                "updated_at": Utc::now().to_rfc3339()
            }),
            AppointmentStatus::Completed,
            auth_token,
        ).await?;

        info!("Appointment {} completed", appointment_id);
        Ok(completed)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn list_member_appointments(
        &self,
        member_id: Uuid,
        query: &AppointmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_appointments("member_id", member_id, query, auth_token).await
    }

    pub async fn list_physician_appointments(
        &self,
        physician_id: Uuid,
        query: &AppointmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.list_appointments("physician_id", physician_id, query, auth_token).await
    }

    async fn list_appointments(
        &self,
        owner_column: &str,
        owner_id: Uuid,
        query: &AppointmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = build_list_query(owner_column, owner_id, query)?;
        debug!("Listing appointments: {}", path);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let appointments = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()?;

        Ok(appointments)
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    async fn bookable_physician(
        &self,
        physician_id: Uuid,
        auth_token: &str,
    ) -> Result<Physician, AppointmentError> {
        let physician = self.physicians
            .get_physician(physician_id, Some(auth_token))
            .await?;

        if !physician.is_available {
            warn!("Physician {} is not accepting appointments", physician_id);
            return Err(AppointmentError::PhysicianUnavailable);
        }

        Ok(physician)
    }

    async fn ensure_slot_free(
        &self,
        physician_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let (windows, conflicts) = tokio::try_join!(
            self.conflict_service.schedule_windows(physician_id, start_time, auth_token),
            self.conflict_service.check_conflicts(
                physician_id,
                start_time,
                end_time,
                exclude_appointment_id,
                auth_token,
            ),
        )?;

        if !fits_schedule(&windows, start_time, end_time) {
            warn!("Requested {} - {} is outside physician {}'s schedule", start_time, end_time, physician_id);
            return Err(AppointmentError::OutsideSchedule);
        }

        if !conflicts.is_empty() {
            return Err(AppointmentError::ConflictDetected);
        }

        Ok(())
    }

    async fn create_appointment_record(
        &self,
        member_id: Uuid,
        physician_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let appointment_data = json!({
            "member_id": member_id,
            "physician_id": physician_id,
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339(),
            "status": AppointmentStatus::Scheduled.to_string(),
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(appointment_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| AppointmentError::Database("Failed to create appointment".to_string()))?;
        Ok(serde_json::from_value(row)?)
    }

    async fn verify_no_double_booking(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let overlapping = self.conflict_service.check_conflicts(
            appointment.physician_id,
            appointment.start_time,
            appointment.end_time,
            Some(appointment.id),
            auth_token,
        ).await?;

        if let Some(rival) = overlapping_rival(appointment.id, &overlapping) {
            warn!("Appointment {} collided with concurrent booking {}, cancelling",
                  appointment.id, rival.id);
            self.patch_scheduled(
                appointment.id,
                cancellation_update(DOUBLE_BOOKING_REASON, None),
                AppointmentStatus::Cancelled,
                auth_token,
            ).await?;
            return Err(AppointmentError::DoubleBooking);
        }

        Ok(())
    }

    /// Patches a row only while it is still scheduled, so a concurrent
    /// cancel or completion is never overwritten.
    async fn patch_scheduled(
        &self,
        appointment_id: Uuid,
        update: Value,
        target_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&status=eq.scheduled", appointment_id);

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update),
            Some(return_representation()),
        ).await?;

        match result.into_iter().next() {
            Some(row) => Ok(serde_json::from_value(row)?),
            None => {
                let current = self.get_appointment(appointment_id, auth_token).await?;
                Err(AppointmentError::InvalidStatusTransition {
                    from: current.status,
                    to: target_status,
                })
            }
        }
    }
}

fn times_update(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Value {
    json!({
        "start_time": start_time.to_rfc3339(),
        "end_time": end_time.to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn cancellation_update(reason: &str, cancelled_by: Option<Uuid>) -> Value {
    json!({
        "status": AppointmentStatus::Cancelled.to_string(),
        "cancellation_reason": reason,
        "cancelled_by": cancelled_by,
        "updated_at": Utc::now().to_rfc3339()
    })
}

pub fn build_list_query(
    owner_column: &str,
    owner_id: Uuid,
    query: &AppointmentListQuery,
) -> Result<String, AppointmentError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from >= to {
            return Err(AppointmentError::Validation("`from` must be before `to`".to_string()));
        }
    }

    let mut path = format!("/rest/v1/appointments?{}=eq.{}", owner_column, owner_id);

    if let Some(status) = query.status {
        path.push_str(&format!("&status=eq.{}", status));
    }
    if let Some(from) = query.from {
        path.push_str(&format!("&start_time=gte.{}", urlencoding::encode(&from.to_rfc3339())));
    }
    if let Some(to) = query.to {
        path.push_str(&format!("&start_time=lt.{}", urlencoding::encode(&to.to_rfc3339())));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    path.push_str(&format!("&order=start_time.asc&limit={}&offset={}", limit, offset));

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone};

    #[test]
    fn list_query_defaults() {
        let id = Uuid::new_v4();
        let path = build_list_query("member_id", id, &AppointmentListQuery::default()).unwrap();
        assert_eq!(
            path,
            format!("/rest/v1/appointments?member_id=eq.{}&order=start_time.asc&limit=50&offset=0", id)
        );
    }

    #[test]
    fn list_query_filters_and_clamps() {
        let id = Uuid::new_v4();
        let from = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let query = AppointmentListQuery {
            status: Some(AppointmentStatus::Scheduled),
            from: Some(from),
            to: Some(from + Duration::days(7)),
            limit: Some(10_000),
            offset: Some(-3),
        };

        let path = build_list_query("physician_id", id, &query).unwrap();
        assert!(path.contains("&status=eq.scheduled"));
        assert!(path.contains("&start_time=gte.2025-03-01T00%3A00%3A00%2B00%3A00"));
        assert!(path.contains("&start_time=lt.2025-03-08T00%3A00%3A00%2B00%3A00"));
        assert!(path.ends_with("&limit=200&offset=0"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let from = Utc::now();
        let query = AppointmentListQuery {
            from: Some(from),
            to: Some(from - Duration::hours(1)),
            ..Default::default()
        };
        assert_matches!(build_list_query("member_id", Uuid::new_v4(), &query), Err(AppointmentError::Validation(_)));
    }

    #[test]
    fn cancellation_body_records_reason_and_actor() {
        let actor = Uuid::new_v4();
        let body = cancellation_update("feeling better", Some(actor));
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["cancellation_reason"], "feeling better");
        assert_eq!(body["cancelled_by"], json!(actor));

        assert!(cancellation_update(DOUBLE_BOOKING_REASON, None)["cancelled_by"].is_null());
    }
}
