use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use thiserror::Error;

use shared_models::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    ConsultationNote,
    Prescription,
    LabResult,
    Imaging,
    Other,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::ConsultationNote => "consultation_note",
            RecordType::Prescription => "prescription",
            RecordType::LabResult => "lab_result",
            RecordType::Imaging => "imaging",
            RecordType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub physician_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub title: String,
    pub record_type: RecordType,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MedicalRecord {
    /// The member it belongs to or the physician who wrote it.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.member_id.to_string() == user_id
            || self.physician_id.is_some_and(|p| p.to_string() == user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Base64 file content, optionally as a `data:<mime>;base64,` URL.
    pub file_data: String,
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    /// Required when a physician or admin files a record for a member.
    pub member_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub title: String,
    pub record_type: RecordType,
    pub description: Option<String>,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordListQuery {
    pub record_type: Option<RecordType>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Medical record not found")]
    NotFound,

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for RecordError {
    fn from(err: anyhow::Error) -> Self {
        RecordError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        RecordError::Database(format!("Unexpected row shape: {}", err))
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound => AppError::NotFound(err.to_string()),
            RecordError::InvalidAttachment(_) => AppError::BadRequest(err.to_string()),
            RecordError::Validation(msg) => AppError::ValidationError(msg),
            RecordError::Storage(msg) => AppError::ExternalService(msg),
            RecordError::Database(msg) => AppError::Database(msg),
        }
    }
}
