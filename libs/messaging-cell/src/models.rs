use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use thiserror::Error;

use physician_cell::models::PhysicianError;
use shared_models::error::AppError;

pub const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub member_id: Uuid,
    pub physician_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.member_id.to_string() == user_id || self.physician_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The caller is one side of the conversation; the other side is named here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenConversationRequest {
    pub member_id: Option<Uuid>,
    pub physician_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageListQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Physician not found")]
    PhysicianNotFound,

    #[error("Only the conversation's participants can do this")]
    NotParticipant,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for MessagingError {
    fn from(err: anyhow::Error) -> Self {
        if shared_database::supabase::is_conflict(&err) {
            MessagingError::Conflict(err.to_string())
        } else {
            MessagingError::Database(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::Database(format!("Unexpected row shape: {}", err))
    }
}

impl From<PhysicianError> for MessagingError {
    fn from(err: PhysicianError) -> Self {
        match err {
            PhysicianError::NotFound => MessagingError::PhysicianNotFound,
            other => MessagingError::Database(other.to_string()),
        }
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::ConversationNotFound | MessagingError::PhysicianNotFound => {
                AppError::NotFound(err.to_string())
            }
            MessagingError::NotParticipant => AppError::Forbidden(err.to_string()),
            MessagingError::Validation(msg) => AppError::ValidationError(msg),
            MessagingError::Conflict(msg) => AppError::Conflict(msg),
            MessagingError::Database(msg) => AppError::Database(msg),
        }
    }
}
