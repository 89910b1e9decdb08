use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_utils::validation::{clean_text, is_valid_email, is_valid_phone};

use crate::models::{CreateMemberRequest, Member, MemberError, UpdateMemberRequest};

const MAX_NAME_LEN: usize = 100;
const MAX_RESIDENCE_LEN: usize = 255;

pub struct MemberService {
    supabase: SupabaseClient,
}

impl MemberService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Creates the profile row for the member whose auth id is `member_id`.
    pub async fn create_member(
        &self,
        member_id: &str,
        request: CreateMemberRequest,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Member, MemberError> {
        debug!("Creating member profile for: {}", request.email);

        let first_name = clean_text(&request.first_name, "First name", MAX_NAME_LEN)
            .map_err(MemberError::Validation)?;
        let last_name = clean_text(&request.last_name, "Last name", MAX_NAME_LEN)
            .map_err(MemberError::Validation)?;
        if !is_valid_email(&request.email) {
            return Err(MemberError::Validation("A valid email address is required".to_string()));
        }
        validate_phone(request.phone_number.as_deref())?;
        validate_date_of_birth(request.date_of_birth, today)?;
        let residence = request.residence
            .as_deref()
            .map(|r| clean_text(r, "Residence", MAX_RESIDENCE_LEN))
            .transpose()
            .map_err(MemberError::Validation)?;

        let existing_path = format!("/rest/v1/members?id=eq.{}&select=id", member_id);
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &existing_path,
            Some(auth_token),
            None,
        ).await?;

        if !existing.is_empty() {
            return Err(MemberError::Conflict("Member profile already exists".to_string()));
        }

        let member_data = json!({
            "id": member_id,
            "first_name": first_name,
            "last_name": last_name,
            "email": request.email.trim(),
            "phone_number": request.phone_number.map(|p| p.trim().to_string()),
            "residence": residence,
            "date_of_birth": request.date_of_birth,
            "gender": request.gender,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/members",
            Some(auth_token),
            Some(member_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| MemberError::Database("Failed to create member profile".to_string()))?;
        let member: Member = serde_json::from_value(row)?;

        info!("Member profile created with ID: {}", member.id);
        Ok(member)
    }

    pub async fn get_member(
        &self,
        member_id: &str,
        auth_token: &str,
    ) -> Result<Member, MemberError> {
        debug!("Fetching member profile: {}", member_id);

        let path = format!("/rest/v1/members?id=eq.{}", member_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(MemberError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn update_member(
        &self,
        member_id: &str,
        request: UpdateMemberRequest,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Member, MemberError> {
        debug!("Updating member profile: {}", member_id);

        let update_data = build_update(request, today)?;

        let path = format!("/rest/v1/members?id=eq.{}", member_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(MemberError::NotFound)?;
        let member: Member = serde_json::from_value(row)?;

        info!("Member profile {} updated", member.id);
        Ok(member)
    }
}

/// Validated partial update body. Fails when nothing would change.
fn build_update(
    request: UpdateMemberRequest,
    today: NaiveDate,
) -> Result<serde_json::Map<String, Value>, MemberError> {
    let mut update_data = serde_json::Map::new();

    if let Some(first_name) = request.first_name {
        let value = clean_text(&first_name, "First name", MAX_NAME_LEN).map_err(MemberError::Validation)?;
        update_data.insert("first_name".to_string(), json!(value));
    }
    if let Some(last_name) = request.last_name {
        let value = clean_text(&last_name, "Last name", MAX_NAME_LEN).map_err(MemberError::Validation)?;
        update_data.insert("last_name".to_string(), json!(value));
    }
    if let Some(phone_number) = request.phone_number {
        validate_phone(Some(&phone_number))?;
        update_data.insert("phone_number".to_string(), json!(phone_number.trim()));
    }
    if let Some(residence) = request.residence {
        let value = clean_text(&residence, "Residence", MAX_RESIDENCE_LEN).map_err(MemberError::Validation)?;
        update_data.insert("residence".to_string(), json!(value));
    }
    if let Some(date_of_birth) = request.date_of_birth {
        validate_date_of_birth(Some(date_of_birth), today)?;
        update_data.insert("date_of_birth".to_string(), json!(date_of_birth));
    }
    if let Some(gender) = request.gender {
        update_data.insert("gender".to_string(), json!(gender));
    }
    if let Some(avatar_url) = request.avatar_url {
        update_data.insert("avatar_url".to_string(), json!(avatar_url));
    }

    if update_data.is_empty() {
        return Err(MemberError::Validation("No fields to update".to_string()));
    }

    update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
    Ok(update_data)
}

fn validate_phone(phone: Option<&str>) -> Result<(), MemberError> {
    match phone {
        Some(p) if !is_valid_phone(p) => {
            Err(MemberError::Validation("Phone number format is invalid".to_string()))
        }
        _ => Ok(()),
    }
}

fn validate_date_of_birth(date_of_birth: Option<NaiveDate>, today: NaiveDate) -> Result<(), MemberError> {
    match date_of_birth {
        Some(dob) if dob > today => {
            Err(MemberError::Validation("Date of birth cannot be in the future".to_string()))
        }
        _ => Ok(()),
    }
}
