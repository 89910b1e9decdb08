// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use physician_cell::models::PhysicianError;
use shared_models::error::AppError;

pub const DOUBLE_BOOKING_REASON: &str = "double-booking detected";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub member_id: Uuid,
    pub physician_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }

    /// Whether `user_id` is the member or the physician of this appointment.
    pub fn involves(&self, user_id: &str) -> bool {
        self.member_id.to_string() == user_id || self.physician_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub physician_id: Uuid,
    pub start_time: DateTime<Utc>,
    /// Required when a physician or admin books on a member's behalf.
    pub member_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// DETAILS & PAYMENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetail {
    pub appointment_id: Uuid,
    pub reason_for_visit: String,
    pub symptoms: Option<String>,
    pub current_medications: Option<String>,
    pub allergies: Option<String>,
    pub additional_notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertDetailRequest {
    pub reason_for_visit: String,
    pub symptoms: Option<String>,
    pub current_medications: Option<String>,
    pub allergies: Option<String>,
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Pending settles once; only a succeeded payment can be refunded.
    pub fn can_move_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Succeeded)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Succeeded, PaymentStatus::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Succeeded => write!(f, "succeeded"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Amount and currency default to the physician's consultation fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub method: String,
    pub status: Option<PaymentStatus>,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Physician not found")]
    PhysicianNotFound,

    #[error("Physician is not accepting appointments")]
    PhysicianUnavailable,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Requested time is outside the physician's schedule")]
    OutsideSchedule,

    #[error("Appointment conflicts with existing booking")]
    ConflictDetected,

    #[error("Appointment slot was taken by a concurrent booking")]
    DoubleBooking,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment details not found")]
    DetailNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("A payment is already recorded for this appointment")]
    PaymentExists,

    #[error("Payment cannot move from {from} to {to}")]
    InvalidPaymentTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        if shared_database::supabase::is_conflict(&err) {
            AppointmentError::ConflictDetected
        } else {
            AppointmentError::Database(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(err: serde_json::Error) -> Self {
        AppointmentError::Database(format!("Unexpected row shape: {}", err))
    }
}

impl From<PhysicianError> for AppointmentError {
    fn from(err: PhysicianError) -> Self {
        match err {
            PhysicianError::NotFound => AppointmentError::PhysicianNotFound,
            PhysicianError::Validation(msg) => AppointmentError::Validation(msg),
            PhysicianError::Conflict(_) => AppointmentError::ConflictDetected,
            PhysicianError::SlotNotFound => AppointmentError::OutsideSchedule,
            PhysicianError::Database(msg) => AppointmentError::Database(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound
            | AppointmentError::PhysicianNotFound
            | AppointmentError::DetailNotFound
            | AppointmentError::PaymentNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::PhysicianUnavailable
            | AppointmentError::InvalidTime(_)
            | AppointmentError::OutsideSchedule
            | AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::InvalidPaymentTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::ConflictDetected
            | AppointmentError::DoubleBooking
            | AppointmentError::PaymentExists => AppError::Conflict(err.to_string()),
            AppointmentError::Database(msg) => AppError::Database(msg),
        }
    }
}
