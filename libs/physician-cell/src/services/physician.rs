use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_utils::validation::{is_valid_currency, is_valid_email};

use crate::models::{
    Physician, PhysicianError, PhysicianSearchFilters, PhysicianWithSlots,
    CreatePhysicianRequest, UpdatePhysicianRequest,
    DEFAULT_CONSULTATION_MINUTES, MIN_CONSULTATION_MINUTES, MAX_CONSULTATION_MINUTES,
};
use crate::services::availability::AvailabilityService;

const DEFAULT_SEARCH_LIMIT: i32 = 20;
const MAX_SEARCH_LIMIT: i32 = 100;

pub struct PhysicianService {
    supabase: SupabaseClient,
    availability: AvailabilityService,
    default_currency: String,
}

impl PhysicianService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            availability: AvailabilityService::new(config),
            default_currency: config.default_currency.clone(),
        }
    }

    /// Creates the profile row for the physician whose auth id is `physician_id`.
    pub async fn create_physician(
        &self,
        physician_id: Uuid,
        request: CreatePhysicianRequest,
        auth_token: &str,
    ) -> Result<Physician, PhysicianError> {
        debug!("Creating physician profile for: {}", request.email);

        validate_names(&request.first_name, &request.last_name)?;
        if !is_valid_email(&request.email) {
            return Err(PhysicianError::Validation("A valid email address is required".to_string()));
        }
        let specialties = clean_list(&request.specialties);
        if specialties.is_empty() {
            return Err(PhysicianError::Validation("At least one specialty is required".to_string()));
        }
        validate_fee(request.consultation_fee)?;
        let duration = request.consultation_duration_minutes.unwrap_or(DEFAULT_CONSULTATION_MINUTES);
        validate_duration(duration)?;
        let currency = request.currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| self.default_currency.clone());
        validate_currency(&currency)?;

        let existing_path = format!("/rest/v1/physicians?id=eq.{}&select=id", physician_id);
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &existing_path,
            Some(auth_token),
            None,
        ).await?;

        if !existing.is_empty() {
            return Err(PhysicianError::Conflict("Physician profile already exists".to_string()));
        }

        let physician_data = json!({
            "id": physician_id,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
            "email": request.email.trim(),
            "specialties": specialties,
            "languages": clean_list(&request.languages),
            "bio": request.bio,
            "consultation_fee": request.consultation_fee,
            "currency": currency,
            "consultation_duration_minutes": duration,
            "is_available": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/physicians",
            Some(auth_token),
            Some(physician_data),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next()
            .ok_or_else(|| PhysicianError::Database("Failed to create physician profile".to_string()))?;
        let physician: Physician = serde_json::from_value(row)?;

        info!("Physician profile created with ID: {}", physician.id);
        Ok(physician)
    }

    pub async fn get_physician(
        &self,
        physician_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Physician, PhysicianError> {
        debug!("Fetching physician profile: {}", physician_id);

        let path = format!("/rest/v1/physicians?id=eq.{}", physician_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(PhysicianError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn update_physician(
        &self,
        physician_id: Uuid,
        request: UpdatePhysicianRequest,
        auth_token: &str,
    ) -> Result<Physician, PhysicianError> {
        debug!("Updating physician profile: {}", physician_id);

        let mut update_data = serde_json::Map::new();

        if let Some(first_name) = request.first_name {
            require_text(&first_name, "First name")?;
            update_data.insert("first_name".to_string(), json!(first_name.trim()));
        }
        if let Some(last_name) = request.last_name {
            require_text(&last_name, "Last name")?;
            update_data.insert("last_name".to_string(), json!(last_name.trim()));
        }
        if let Some(specialties) = request.specialties {
            let specialties = clean_list(&specialties);
            if specialties.is_empty() {
                return Err(PhysicianError::Validation("At least one specialty is required".to_string()));
            }
            update_data.insert("specialties".to_string(), json!(specialties));
        }
        if let Some(languages) = request.languages {
            update_data.insert("languages".to_string(), json!(clean_list(&languages)));
        }
        if let Some(bio) = request.bio {
            update_data.insert("bio".to_string(), json!(bio));
        }
        if let Some(fee) = request.consultation_fee {
            validate_fee(fee)?;
            update_data.insert("consultation_fee".to_string(), json!(fee));
        }
        if let Some(currency) = request.currency {
            let currency = currency.to_uppercase();
            validate_currency(&currency)?;
            update_data.insert("currency".to_string(), json!(currency));
        }
        if let Some(duration) = request.consultation_duration_minutes {
            validate_duration(duration)?;
            update_data.insert("consultation_duration_minutes".to_string(), json!(duration));
        }
        if let Some(url) = request.profile_image_url {
            update_data.insert("profile_image_url".to_string(), json!(url));
        }
        if let Some(available) = request.is_available {
            update_data.insert("is_available".to_string(), json!(available));
        }

        if update_data.is_empty() {
            return Err(PhysicianError::Validation("No fields to update".to_string()));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/physicians?id=eq.{}", physician_id);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(update_data)),
            Some(return_representation()),
        ).await?;

        let row = result.into_iter().next().ok_or(PhysicianError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Searches bookable physicians. With a `date` filter, physicians with no
    /// open window that day are dropped and the rest carry their windows.
    pub async fn search_physicians(
        &self,
        filters: PhysicianSearchFilters,
        now: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<Vec<PhysicianWithSlots>, PhysicianError> {
        debug!("Searching physicians with filters: {:?}", filters);

        let path = format!("/rest/v1/physicians?{}", build_search_query(&filters)?);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        let physicians = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Physician>, _>>()?;

        let Some(date) = filters.date else {
            return Ok(physicians.into_iter()
                .map(|physician| PhysicianWithSlots { physician, available_slots: vec![] })
                .collect());
        };

        let lookups = physicians.iter()
            .map(|p| self.availability.get_available_slots(p.id, date, now, auth_token));
        let slots_per_physician = try_join_all(lookups).await?;

        Ok(physicians.into_iter()
            .zip(slots_per_physician)
            .filter(|(_, slots)| !slots.is_empty())
            .map(|(physician, available_slots)| PhysicianWithSlots { physician, available_slots })
            .collect())
    }
}

pub fn build_search_query(filters: &PhysicianSearchFilters) -> Result<String, PhysicianError> {
    let mut query_parts = vec!["is_available=eq.true".to_string()];

    // PostgREST array containment: specialties=cs.{"Cardiology"}
    if let Some(specialty) = non_blank(&filters.specialty) {
        query_parts.push(format!("specialties=cs.{}", urlencoding::encode(&format!("{{\"{}\"}}", specialty))));
    }
    if let Some(language) = non_blank(&filters.language) {
        query_parts.push(format!("languages=cs.{}", urlencoding::encode(&format!("{{\"{}\"}}", language))));
    }
    if let Some(max_fee) = filters.max_fee {
        if max_fee < 0.0 {
            return Err(PhysicianError::Validation("max_fee cannot be negative".to_string()));
        }
        query_parts.push(format!("consultation_fee=lte.{}", max_fee));
    }
    if let Some(name) = non_blank(&filters.name) {
        let pattern = urlencoding::encode(&format!("*{}*", name)).into_owned();
        query_parts.push(format!("or=(first_name.ilike.{0},last_name.ilike.{0})", pattern));
    }

    let limit = filters.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
    let offset = filters.offset.unwrap_or(0).max(0);
    query_parts.push("order=last_name.asc,first_name.asc".to_string());
    query_parts.push(format!("limit={}", limit));
    query_parts.push(format!("offset={}", offset));

    Ok(query_parts.join("&"))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn clean_list(values: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !cleaned.iter().any(|c| c.eq_ignore_ascii_case(value)) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}

fn validate_names(first_name: &str, last_name: &str) -> Result<(), PhysicianError> {
    require_text(first_name, "First name")?;
    require_text(last_name, "Last name")
}

fn require_text(value: &str, field: &str) -> Result<(), PhysicianError> {
    if value.trim().is_empty() {
        return Err(PhysicianError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn validate_fee(fee: f64) -> Result<(), PhysicianError> {
    if !fee.is_finite() || fee < 0.0 {
        return Err(PhysicianError::Validation("Consultation fee must be a non-negative amount".to_string()));
    }
    Ok(())
}

fn validate_duration(minutes: i32) -> Result<(), PhysicianError> {
    if !(MIN_CONSULTATION_MINUTES..=MAX_CONSULTATION_MINUTES).contains(&minutes) {
        return Err(PhysicianError::Validation(format!(
            "Consultation duration must be between {} and {} minutes",
            MIN_CONSULTATION_MINUTES, MAX_CONSULTATION_MINUTES
        )));
    }
    Ok(())
}

fn validate_currency(currency: &str) -> Result<(), PhysicianError> {
    if !is_valid_currency(currency) {
        return Err(PhysicianError::Validation(format!("Invalid currency code: {}", currency)));
    }
    Ok(())
}
