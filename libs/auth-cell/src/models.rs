use serde::{Deserialize, Serialize};

use shared_models::auth::Role;
use shared_utils::validation::is_valid_email;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub const MIN_PASSWORD_LENGTH: usize = 8;

impl SignUpRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) {
            return Err("A valid email address is required".to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH));
        }
        if self.role == Role::Admin {
            return Err("Administrator accounts cannot be self-registered".to_string());
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err("First and last name are required".to_string());
        }
        Ok(())
    }
}
