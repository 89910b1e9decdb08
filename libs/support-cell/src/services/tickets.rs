use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_utils::validation::clean_text;

use crate::models::{
    CreateTicketRequest, SupportError, SupportTicket, TicketListQuery, TicketReply, TicketStatus,
    UserRole, MAX_DESCRIPTION_LEN, MAX_REPLY_LEN, MAX_SUBJECT_LEN,
};

/// Status rules for tickets.
pub struct TicketPolicy;

impl TicketPolicy {
    pub fn valid_transitions(current: TicketStatus) -> Vec<TicketStatus> {
        match current {
            TicketStatus::Open => vec![
                TicketStatus::InProgress,
                TicketStatus::Resolved,
                TicketStatus::Closed,
            ],
            TicketStatus::InProgress => vec![TicketStatus::Resolved, TicketStatus::Closed],
            TicketStatus::Resolved => vec![TicketStatus::Closed, TicketStatus::Open],
            TicketStatus::Closed => vec![],
        }
    }

    /// Staff may make any valid move; the ticket's author may only close it
    /// or reopen a resolved one.
    pub fn validate_transition(
        current: TicketStatus,
        next: TicketStatus,
        is_staff: bool,
    ) -> Result<(), SupportError> {
        if !Self::valid_transitions(current).contains(&next) {
            warn!("Invalid ticket transition attempted: {} -> {}", current, next);
            return Err(SupportError::InvalidStatusTransition { from: current, to: next });
        }

        if !is_staff && !matches!(next, TicketStatus::Closed | TicketStatus::Open) {
            return Err(SupportError::NotPermitted(
                "Only support staff can change a ticket to that status".to_string(),
            ));
        }

        Ok(())
    }
}

pub struct SupportService {
    supabase: SupabaseClient,
}

impl SupportService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_ticket(
        &self,
        user_id: Uuid,
        user_role: UserRole,
        request: CreateTicketRequest,
        auth_token: &str,
    ) -> Result<SupportTicket, SupportError> {
        let subject = clean_text(&request.subject, "Subject", MAX_SUBJECT_LEN)
            .map_err(SupportError::Validation)?;
        let description = clean_text(&request.description, "Description", MAX_DESCRIPTION_LEN)
            .map_err(SupportError::Validation)?;

        let now = Utc::now().to_rfc3339();
        let ticket_data = json!({
            "user_id": user_id,
            "user_role": user_role,
            "subject": subject,
            "description": description,
            "category": request.category,
            "status": TicketStatus::Open,
            "created_at": now,
            "updated_at": now
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/support_tickets",
            Some(auth_token),
            Some(ticket_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| SupportError::Database("Failed to create support ticket".to_string()))?;
        let ticket: SupportTicket = serde_json::from_value(row)?;

        info!("Support ticket {} opened by {}", ticket.id, user_id);
        Ok(ticket)
    }

    /// Lists one user's tickets, or every ticket when `owner` is `None`.
    pub async fn list_tickets(
        &self,
        owner: Option<&str>,
        query: &TicketListQuery,
        auth_token: &str,
    ) -> Result<Vec<SupportTicket>, SupportError> {
        let mut filters = Vec::new();
        if let Some(user_id) = owner {
            filters.push(format!("user_id=eq.{}", user_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(category) = query.category {
            filters.push(format!("category=eq.{}", category.as_str()));
        }
        filters.push("order=updated_at.desc".to_string());

        let path = format!("/rest/v1/support_tickets?{}", filters.join("&"));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let tickets = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<SupportTicket>, _>>()?;

        Ok(tickets)
    }

    pub async fn get_ticket(
        &self,
        ticket_id: Uuid,
        auth_token: &str,
    ) -> Result<SupportTicket, SupportError> {
        let path = format!("/rest/v1/support_tickets?id=eq.{}", ticket_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(SupportError::TicketNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Moves the ticket to `next`. The write is conditional on the status
    /// read, so a concurrent change surfaces as an invalid transition.
    pub async fn update_status(
        &self,
        ticket: &SupportTicket,
        next: TicketStatus,
        is_staff: bool,
        auth_token: &str,
    ) -> Result<SupportTicket, SupportError> {
        TicketPolicy::validate_transition(ticket.status, next, is_staff)?;

        let path = format!(
            "/rest/v1/support_tickets?id=eq.{}&status=eq.{}",
            ticket.id, ticket.status
        );
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({ "status": next, "updated_at": Utc::now().to_rfc3339() })),
            Some(return_representation()),
        ).await?;

        match result.into_iter().next() {
            Some(row) => {
                let updated: SupportTicket = serde_json::from_value(row)?;
                info!("Support ticket {} moved {} -> {}", ticket.id, ticket.status, next);
                Ok(updated)
            }
            None => {
                let current = self.get_ticket(ticket.id, auth_token).await?;
                warn!("Support ticket {} changed underneath status update", ticket.id);
                Err(SupportError::InvalidStatusTransition { from: current.status, to: next })
            }
        }
    }

    pub async fn add_reply(
        &self,
        ticket: &SupportTicket,
        author_id: Uuid,
        body: &str,
        auth_token: &str,
    ) -> Result<TicketReply, SupportError> {
        if ticket.status == TicketStatus::Closed {
            return Err(SupportError::Validation("Cannot reply to a closed ticket".to_string()));
        }

        let body = clean_text(body, "Reply", MAX_REPLY_LEN).map_err(SupportError::Validation)?;
        let now = Utc::now().to_rfc3339();

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/ticket_replies",
            Some(auth_token),
            Some(json!({
                "ticket_id": ticket.id,
                "author_id": author_id,
                "body": body,
                "created_at": now
            })),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| SupportError::Database("Failed to add reply".to_string()))?;
        let reply: TicketReply = serde_json::from_value(row)?;

        let touch_path = format!("/rest/v1/support_tickets?id=eq.{}", ticket.id);
        self.supabase.execute(
            Method::PATCH,
            &touch_path,
            Some(auth_token),
            Some(json!({ "updated_at": now })),
        ).await?;

        debug!("Reply {} added to ticket {}", reply.id, ticket.id);
        Ok(reply)
    }

    pub async fn list_replies(
        &self,
        ticket: &SupportTicket,
        auth_token: &str,
    ) -> Result<Vec<TicketReply>, SupportError> {
        let path = format!(
            "/rest/v1/ticket_replies?ticket_id=eq.{}&order=created_at.asc",
            ticket.id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let replies = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<TicketReply>, _>>()?;

        Ok(replies)
    }
}
