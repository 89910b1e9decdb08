use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use physician_cell::services::PhysicianService;
use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_utils::validation::clean_text;

use crate::models::{Conversation, Message, MessageListQuery, MessagingError, MAX_MESSAGE_LEN};

const DEFAULT_PAGE_SIZE: i32 = 50;
const MAX_PAGE_SIZE: i32 = 200;

pub struct MessagingService {
    supabase: SupabaseClient,
    physicians: PhysicianService,
}

impl MessagingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            physicians: PhysicianService::new(config),
        }
    }

    /// Returns the pair's conversation, creating it on first contact. The
    /// flag tells whether a new row was written.
    pub async fn open_conversation(
        &self,
        member_id: Uuid,
        physician_id: Uuid,
        auth_token: &str,
    ) -> Result<(Conversation, bool), MessagingError> {
        debug!("Opening conversation between member {} and physician {}", member_id, physician_id);

        if let Some(existing) = self.find_conversation(member_id, physician_id, auth_token).await? {
            return Ok((existing, false));
        }

        self.physicians
            .get_physician(physician_id, Some(auth_token))
            .await?;

        let conversation_data = json!({
            "member_id": member_id,
            "physician_id": physician_id,
            "created_at": Utc::now().to_rfc3339()
        });

        let created: Result<Vec<Value>, MessagingError> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/conversations",
            Some(auth_token),
            Some(conversation_data),
            Some(return_representation()),
        ).await.map_err(MessagingError::from);

        match created {
            Ok(rows) => {
                let row = rows.into_iter().next()
                    .ok_or_else(|| MessagingError::Database("Failed to create conversation".to_string()))?;
                let conversation: Conversation = serde_json::from_value(row)?;
                info!("Conversation {} opened", conversation.id);
                Ok((conversation, true))
            }
            // unique (member_id, physician_id): someone else opened it first
            Err(MessagingError::Conflict(_)) => {
                warn!("Conversation for member {} and physician {} created concurrently", member_id, physician_id);
                let existing = self.find_conversation(member_id, physician_id, auth_token).await?
                    .ok_or(MessagingError::ConversationNotFound)?;
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Vec<Conversation>, MessagingError> {
        let path = format!(
            "/rest/v1/conversations?or=(member_id.eq.{},physician_id.eq.{})&order=last_message_at.desc.nullslast,created_at.desc",
            user_id, user_id
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let conversations = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Conversation>, _>>()?;

        Ok(conversations)
    }

    /// Loads a conversation the caller takes part in.
    pub async fn get_conversation_for(
        &self,
        conversation_id: Uuid,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Conversation, MessagingError> {
        let path = format!("/rest/v1/conversations?id=eq.{}", conversation_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(MessagingError::ConversationNotFound)?;
        let conversation: Conversation = serde_json::from_value(row)?;

        if !conversation.has_participant(user_id) {
            warn!("User {} denied access to conversation {}", user_id, conversation_id);
            return Err(MessagingError::NotParticipant);
        }

        Ok(conversation)
    }

    pub async fn list_messages(
        &self,
        conversation: &Conversation,
        query: &MessageListQuery,
        auth_token: &str,
    ) -> Result<Vec<Message>, MessagingError> {
        let path = build_messages_query(conversation.id, query);

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let mut messages = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Message>, _>>()?;

        // fetched newest first for paging, returned oldest first
        messages.reverse();
        Ok(messages)
    }

    pub async fn send_message(
        &self,
        conversation: &Conversation,
        sender_id: Uuid,
        body: &str,
        auth_token: &str,
    ) -> Result<Message, MessagingError> {
        let body = clean_text(body, "Message", MAX_MESSAGE_LEN).map_err(MessagingError::Validation)?;
        let now = Utc::now();

        let message_data = json!({
            "conversation_id": conversation.id,
            "sender_id": sender_id,
            "body": body,
            "created_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/messages",
            Some(auth_token),
            Some(message_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| MessagingError::Database("Failed to send message".to_string()))?;
        let message: Message = serde_json::from_value(row)?;

        // best effort, the message is already stored
        let touch_path = format!("/rest/v1/conversations?id=eq.{}", conversation.id);
        if let Err(e) = self.supabase.execute(
            Method::PATCH,
            &touch_path,
            Some(auth_token),
            Some(json!({ "last_message_at": message.created_at.to_rfc3339() })),
        ).await {
            warn!("Could not stamp last_message_at on conversation {}: {}", conversation.id, e);
        }

        debug!("Message {} sent in conversation {}", message.id, conversation.id);
        Ok(message)
    }

    /// Marks every unread message from the other participant as read and
    /// returns how many changed.
    pub async fn mark_read(
        &self,
        conversation: &Conversation,
        reader_id: &str,
        auth_token: &str,
    ) -> Result<usize, MessagingError> {
        let path = format!(
            "/rest/v1/messages?conversation_id=eq.{}&sender_id=neq.{}&read_at=is.null",
            conversation.id, reader_id
        );

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "read_at": Utc::now().to_rfc3339() })),
            Some(return_representation()),
        ).await?;

        debug!("Marked {} messages read in conversation {}", result.len(), conversation.id);
        Ok(result.len())
    }

    async fn find_conversation(
        &self,
        member_id: Uuid,
        physician_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Conversation>, MessagingError> {
        let path = format!(
            "/rest/v1/conversations?member_id=eq.{}&physician_id=eq.{}",
            member_id, physician_id
        );

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        result.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(MessagingError::from)
    }
}

pub fn build_messages_query(conversation_id: Uuid, query: &MessageListQuery) -> String {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let mut path = format!(
        "/rest/v1/messages?conversation_id=eq.{}&order=created_at.desc&limit={}",
        conversation_id, limit
    );

    if let Some(before) = query.before {
        path.push_str(&format!("&created_at=lt.{}", urlencoding::encode(&before.to_rfc3339())));
    }

    path
}
