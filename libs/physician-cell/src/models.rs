use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveTime, NaiveDate};
use thiserror::Error;

use shared_models::error::AppError;

pub const DEFAULT_CONSULTATION_MINUTES: i32 = 30;
pub const MIN_CONSULTATION_MINUTES: i32 = 10;
pub const MAX_CONSULTATION_MINUTES: i32 = 240;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Physician {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub bio: Option<String>,
    pub consultation_fee: f64,
    pub currency: String,
    pub consultation_duration_minutes: i32,
    pub profile_image_url: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Physician {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn consultation_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.consultation_duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePhysicianRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub specialties: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub bio: Option<String>,
    pub consultation_fee: f64,
    pub currency: Option<String>,
    pub consultation_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePhysicianRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialties: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub bio: Option<String>,
    pub consultation_fee: Option<f64>,
    pub currency: Option<String>,
    pub consultation_duration_minutes: Option<i32>,
    pub profile_image_url: Option<String>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysicianSearchFilters {
    pub specialty: Option<String>,
    pub language: Option<String>,
    pub max_fee: Option<f64>,
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicianWithSlots {
    #[serde(flatten)]
    pub physician: Physician,
    pub available_slots: Vec<AvailableSlot>,
}

// ==============================================================================
// SCHEDULE SLOTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Recurring,
    SpecificDate,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Recurring => "recurring",
            SlotKind::SpecificDate => "specific_date",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub id: Uuid,
    pub physician_id: Uuid,
    pub kind: SlotKind,
    pub day_of_week: Option<i32>, // 0 = Sunday .. 6 = Saturday
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleSlot {
    /// Whether this slot offers time on `date`, by weekday or by exact date.
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self.kind {
            SlotKind::Recurring => self.day_of_week == Some(day_of_week(date)),
            SlotKind::SpecificDate => self.specific_date == Some(date),
        }
    }
}

/// Sunday-based weekday index as stored in `schedule_slots.day_of_week`.
pub fn day_of_week(date: NaiveDate) -> i32 {
    use chrono::Datelike;
    date.weekday().num_days_from_sunday() as i32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub kind: SlotKind,
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSlotRequest {
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_available: Option<bool>,
}

/// A bookable window on a concrete date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl AvailableSlot {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            duration_minutes: (end_time - start_time).num_minutes(),
        }
    }

    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time <= start && end <= self.end_time
    }
}

/// The part of an appointment row availability needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedInterval {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub physician_id: Uuid,
    pub date: NaiveDate,
    pub consultation_duration_minutes: i32,
    pub available_slots: Vec<AvailableSlot>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error)]
pub enum PhysicianError {
    #[error("Physician not found")]
    NotFound,

    #[error("Schedule slot not found")]
    SlotNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for PhysicianError {
    fn from(err: anyhow::Error) -> Self {
        if shared_database::supabase::is_conflict(&err) {
            PhysicianError::Conflict(err.to_string())
        } else {
            PhysicianError::Database(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PhysicianError {
    fn from(err: serde_json::Error) -> Self {
        PhysicianError::Database(format!("Unexpected row shape: {}", err))
    }
}

impl From<PhysicianError> for AppError {
    fn from(err: PhysicianError) -> Self {
        match err {
            PhysicianError::NotFound | PhysicianError::SlotNotFound => AppError::NotFound(err.to_string()),
            PhysicianError::Validation(msg) => AppError::ValidationError(msg),
            PhysicianError::Conflict(msg) => AppError::Conflict(msg),
            PhysicianError::Database(msg) => AppError::Database(msg),
        }
    }
}
