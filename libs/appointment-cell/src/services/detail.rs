use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::validation::clean_text;

use crate::models::{AppointmentDetail, AppointmentError, UpsertDetailRequest};

const MAX_REASON_LEN: usize = 500;
const MAX_NOTE_LEN: usize = 2000;

pub struct AppointmentDetailService {
    supabase: SupabaseClient,
}

impl AppointmentDetailService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Creates or replaces the intake details of an appointment.
    pub async fn upsert_detail(
        &self,
        appointment_id: Uuid,
        request: UpsertDetailRequest,
        auth_token: &str,
    ) -> Result<AppointmentDetail, AppointmentError> {
        debug!("Saving details for appointment {}", appointment_id);

        let body = detail_body(appointment_id, request)?;

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("resolution=merge-duplicates,return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointment_details?on_conflict=appointment_id",
            Some(auth_token),
            Some(body),
            Some(headers),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| AppointmentError::Database("Failed to save appointment details".to_string()))?;

        info!("Details saved for appointment {}", appointment_id);
        Ok(serde_json::from_value(row)?)
    }

    pub async fn get_detail(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentDetail, AppointmentError> {
        let path = format!("/rest/v1/appointment_details?appointment_id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(AppointmentError::DetailNotFound)?;
        Ok(serde_json::from_value(row)?)
    }
}

fn detail_body(appointment_id: Uuid, request: UpsertDetailRequest) -> Result<Value, AppointmentError> {
    let reason = clean_text(&request.reason_for_visit, "Reason for visit", MAX_REASON_LEN)
        .map_err(AppointmentError::Validation)?;

    Ok(json!({
        "appointment_id": appointment_id,
        "reason_for_visit": reason,
        "symptoms": optional_note(request.symptoms, "Symptoms")?,
        "current_medications": optional_note(request.current_medications, "Current medications")?,
        "allergies": optional_note(request.allergies, "Allergies")?,
        "additional_notes": optional_note(request.additional_notes, "Additional notes")?,
        "updated_at": Utc::now().to_rfc3339()
    }))
}

/// Blank notes are stored as null.
fn optional_note(value: Option<String>, field: &str) -> Result<Option<String>, AppointmentError> {
    match value {
        Some(v) if !v.trim().is_empty() => clean_text(&v, field, MAX_NOTE_LEN)
            .map(Some)
            .map_err(AppointmentError::Validation),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(reason: &str) -> UpsertDetailRequest {
        UpsertDetailRequest {
            reason_for_visit: reason.to_string(),
            symptoms: Some("  headache ".to_string()),
            current_medications: Some("   ".to_string()),
            allergies: None,
            additional_notes: None,
        }
    }

    #[test]
    fn body_trims_and_nulls_blank_notes() {
        let body = detail_body(Uuid::new_v4(), request(" Recurring migraines ")).unwrap();
        assert_eq!(body["reason_for_visit"], "Recurring migraines");
        assert_eq!(body["symptoms"], "headache");
        assert!(body["current_medications"].is_null());
    }

    #[test]
    fn reason_is_required() {
        assert_matches!(detail_body(Uuid::new_v4(), request("  ")), Err(AppointmentError::Validation(_)));
    }

    #[test]
    fn overlong_note_is_rejected() {
        let long = "x".repeat(MAX_NOTE_LEN + 1);
        assert_matches!(optional_note(Some(long), "Allergies"), Err(AppointmentError::Validation(_)));
    }
}
