use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use thiserror::Error;

use shared_models::error::AppError;

pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_REPLY_LEN: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Member,
    Physician,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Technical,
    Billing,
    Appointment,
    Account,
    Other,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::Technical => "technical",
            TicketCategory::Billing => "billing",
            TicketCategory::Appointment => "appointment",
            TicketCategory::Account => "account",
            TicketCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub subject: String,
    pub description: String,
    pub category: TicketCategory,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketReply {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    pub category: TicketCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTicketStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReplyRequest {
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub category: Option<TicketCategory>,
}

#[derive(Debug, Error)]
pub enum SupportError {
    #[error("Support ticket not found")]
    TicketNotFound,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: TicketStatus, to: TicketStatus },

    #[error("{0}")]
    NotPermitted(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for SupportError {
    fn from(err: anyhow::Error) -> Self {
        SupportError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SupportError {
    fn from(err: serde_json::Error) -> Self {
        SupportError::Database(format!("Unexpected row shape: {}", err))
    }
}

impl From<SupportError> for AppError {
    fn from(err: SupportError) -> Self {
        match err {
            SupportError::TicketNotFound => AppError::NotFound(err.to_string()),
            SupportError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            SupportError::NotPermitted(msg) => AppError::Forbidden(msg),
            SupportError::Validation(msg) => AppError::ValidationError(msg),
            SupportError::Database(msg) => AppError::Database(msg),
        }
    }
}
