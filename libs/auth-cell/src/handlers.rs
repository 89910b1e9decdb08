use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::HeaderMap,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::{supabase_error, SupabaseClient, SupabaseError};
use shared_models::auth::{Role, TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::extract_bearer_token;
use shared_utils::jwt;

use crate::models::{RefreshRequest, SignInRequest, SignUpRequest};

fn map_auth_service_error(err: anyhow::Error) -> AppError {
    match supabase_error(&err) {
        Some(SupabaseError::Auth(msg)) => AppError::Auth(msg.clone()),
        // GoTrue answers bad credentials and duplicate emails with 400/422
        Some(SupabaseError::Api { status: 400, message }) => AppError::Auth(message.clone()),
        Some(SupabaseError::Api { status: 422, message }) => AppError::Conflict(message.clone()),
        _ => AppError::ExternalService(err.to_string()),
    }
}

pub async fn sign_up(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<SignUpRequest>,
) -> Result<Json<Value>, AppError> {
    request.validate().map_err(AppError::ValidationError)?;
    debug!("Signing up {} as {}", request.email, request.role);

    let client = SupabaseClient::new(&config);
    let session = client.auth_request("signup", json!({
        "email": request.email.trim(),
        "password": request.password,
        "data": {
            "role": request.role,
            "first_name": request.first_name.trim(),
            "last_name": request.last_name.trim(),
        }
    }))
    .await
    .map_err(map_auth_service_error)?;

    info!("New {} account registered", request.role);
    Ok(Json(session))
}

pub async fn sign_in(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<Value>, AppError> {
    debug!("Signing in {}", request.email);

    let client = SupabaseClient::new(&config);
    let session = client.auth_request("token?grant_type=password", json!({
        "email": request.email.trim(),
        "password": request.password,
    }))
    .await
    .map_err(|e| {
        warn!("Sign in failed for {}", request.email);
        map_auth_service_error(e)
    })?;

    Ok(Json(session))
}

pub async fn refresh_session(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Value>, AppError> {
    if request.refresh_token.trim().is_empty() {
        return Err(AppError::BadRequest("refresh_token is required".to_string()));
    }

    let client = SupabaseClient::new(&config);
    let session = client.auth_request("token?grant_type=refresh_token", json!({
        "refresh_token": request.refresh_token,
    }))
    .await
    .map_err(map_auth_service_error)?;

    Ok(Json(session))
}

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;
    let user = jwt::validate_token(&token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    Ok(Json(TokenResponse {
        valid: true,
        role: user.app_role().map(|r| r.to_string()).or(user.role),
        user_id: user.id,
        email: user.email,
    }))
}

pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let token = extract_bearer_token(&headers)?;
    let valid = jwt::validate_token(&token, &config.supabase_jwt_secret).is_ok();

    Ok(Json(json!({ "valid": valid })))
}

pub async fn get_current_user(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let client = SupabaseClient::new(&config);
    let table = match user.app_role() {
        Some(Role::Physician) => Some("physicians"),
        Some(Role::Member) => Some("members"),
        _ => None,
    };

    let profile = match table {
        Some(table) => {
            let path = format!("/rest/v1/{}?id=eq.{}", table, user.id);
            let rows: Vec<Value> = client
                .request(Method::GET, &path, Some(auth.token()), None)
                .await
                .map_err(|e| AppError::ExternalService(e.to_string()))?;
            rows.into_iter().next()
        }
        None => None,
    };

    let profile_complete = profile.is_some();

    Ok(Json(json!({
        "user_id": user.id,
        "email": user.email,
        "role": user.app_role(),
        "profile": profile,
        "profile_complete": profile_complete,
    })))
}
