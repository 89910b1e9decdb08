use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use physician_cell::services::PhysicianService;
use shared_config::AppConfig;
use shared_database::supabase::{is_conflict, return_representation, SupabaseClient};
use shared_utils::validation::{clean_text, is_valid_currency};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreatePaymentRequest, Payment, PaymentStatus,
    UpdatePaymentStatusRequest,
};

const MAX_METHOD_LEN: usize = 50;
const MAX_REFERENCE_LEN: usize = 200;

pub struct PaymentService {
    supabase: SupabaseClient,
    physicians: PhysicianService,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            physicians: PhysicianService::new(config),
        }
    }

    /// Records the single payment of an appointment.
    pub async fn record_payment(
        &self,
        appointment: &Appointment,
        request: CreatePaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, AppointmentError> {
        debug!("Recording payment for appointment {}", appointment.id);

        if appointment.status == AppointmentStatus::Cancelled
            && request.status != Some(PaymentStatus::Refunded)
        {
            return Err(AppointmentError::Validation(
                "Only refunds can be recorded for a cancelled appointment".to_string(),
            ));
        }

        let existing_path = format!("/rest/v1/payments?appointment_id=eq.{}&select=id", appointment.id);
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &existing_path,
            Some(auth_token),
            None,
        ).await?;

        if !existing.is_empty() {
            warn!("Duplicate payment attempt for appointment {}", appointment.id);
            return Err(AppointmentError::PaymentExists);
        }

        let (amount, currency) = match (request.amount, request.currency.as_deref()) {
            (Some(amount), Some(currency)) => (amount, currency.to_uppercase()),
            (amount, currency) => {
                let physician = self.physicians
                    .get_physician(appointment.physician_id, Some(auth_token))
                    .await?;
                (
                    amount.unwrap_or(physician.consultation_fee),
                    currency.map(str::to_uppercase).unwrap_or(physician.currency),
                )
            }
        };

        let payment_data = payment_body(appointment.id, amount, &currency, &request)?;

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/payments",
            Some(auth_token),
            Some(payment_data),
            Some(return_representation()),
        ).await
            .map_err(|e| if is_conflict(&e) { AppointmentError::PaymentExists } else { e.into() })?;

        let row = result.into_iter().next()
            .ok_or_else(|| AppointmentError::Database("Failed to record payment".to_string()))?;
        let payment: Payment = serde_json::from_value(row)?;

        info!("Payment {} of {} {} recorded for appointment {}",
              payment.id, payment.amount, payment.currency, appointment.id);
        Ok(payment)
    }

    pub async fn get_payment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Payment, AppointmentError> {
        let path = format!("/rest/v1/payments?appointment_id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(AppointmentError::PaymentNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Settles or refunds the payment. The write is conditional on the status
    /// read, so a concurrent change surfaces as an invalid transition.
    pub async fn update_payment_status(
        &self,
        appointment_id: Uuid,
        request: UpdatePaymentStatusRequest,
        auth_token: &str,
    ) -> Result<Payment, AppointmentError> {
        let current = self.get_payment(appointment_id, auth_token).await?;
        if !current.status.can_move_to(request.status) {
            warn!("Invalid payment transition attempted: {} -> {}", current.status, request.status);
            return Err(AppointmentError::InvalidPaymentTransition {
                from: current.status,
                to: request.status,
            });
        }

        let mut update = json!({ "status": request.status });
        if let Some(reference) = request.provider_reference.as_deref() {
            let reference = clean_text(reference, "Provider reference", MAX_REFERENCE_LEN)
                .map_err(AppointmentError::Validation)?;
            update["provider_reference"] = json!(reference);
        }

        let path = format!("/rest/v1/payments?id=eq.{}&status=eq.{}", current.id, current.status);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update),
            Some(return_representation()),
        ).await?;

        match result.into_iter().next() {
            Some(row) => {
                let updated: Payment = serde_json::from_value(row)?;
                info!("Payment {} moved {} -> {}", updated.id, current.status, updated.status);
                Ok(updated)
            }
            None => {
                let latest = self.get_payment(appointment_id, auth_token).await?;
                warn!("Payment {} changed underneath status update", current.id);
                Err(AppointmentError::InvalidPaymentTransition {
                    from: latest.status,
                    to: request.status,
                })
            }
        }
    }
}

fn payment_body(
    appointment_id: Uuid,
    amount: f64,
    currency: &str,
    request: &CreatePaymentRequest,
) -> Result<Value, AppointmentError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppointmentError::Validation("Payment amount must be positive".to_string()));
    }
    if !is_valid_currency(currency) {
        return Err(AppointmentError::Validation("Currency must be a 3-letter code".to_string()));
    }
    let method = clean_text(&request.method, "Payment method", MAX_METHOD_LEN)
        .map_err(AppointmentError::Validation)?;

    Ok(json!({
        "appointment_id": appointment_id,
        "amount": amount,
        "currency": currency,
        "status": request.status.unwrap_or(PaymentStatus::Pending),
        "method": method,
        "provider_reference": request.provider_reference,
        "created_at": Utc::now().to_rfc3339()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: None,
            currency: None,
            method: " card ".to_string(),
            status: None,
            provider_reference: Some("ch_123".to_string()),
        }
    }

    #[test]
    fn body_defaults_to_pending() {
        let body = payment_body(Uuid::new_v4(), 80.0, "USD", &request()).unwrap();
        assert_eq!(body["status"], "pending");
        assert_eq!(body["method"], "card");
        assert_eq!(body["amount"], 80.0);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        for amount in [0.0, -5.0, f64::NAN] {
            assert_matches!(
                payment_body(Uuid::new_v4(), amount, "USD", &request()),
                Err(AppointmentError::Validation(_))
            );
        }
    }

    #[test]
    fn payment_status_moves() {
        assert!(PaymentStatus::Pending.can_move_to(PaymentStatus::Succeeded));
        assert!(PaymentStatus::Pending.can_move_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Succeeded.can_move_to(PaymentStatus::Refunded));

        assert!(!PaymentStatus::Pending.can_move_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Failed.can_move_to(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::Refunded.can_move_to(PaymentStatus::Succeeded));
        assert!(!PaymentStatus::Succeeded.can_move_to(PaymentStatus::Succeeded));
    }

    #[test]
    fn currency_must_be_three_letters() {
        assert_matches!(
            payment_body(Uuid::new_v4(), 10.0, "EURO", &request()),
            Err(AppointmentError::Validation(_))
        );
    }
}
