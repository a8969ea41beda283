//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::store::{Account, TrustedDevice};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

/// Light syntactic check; deliverability is the notifier's problem.
pub fn valid_email(candidate: &str) -> bool {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(candidate))
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl From<&Account> for UserResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            role: account.role.as_str().to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Password accepted, code delivered; the client must come back with both
/// the pre-auth token and the code.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    pub pre_auth_token: String,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub pre_auth_token: String,
    pub code: String,
    #[serde(default)]
    pub remember_device: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub browser: String,
    pub os: String,
    pub device_class: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl From<&TrustedDevice> for DeviceResponse {
    fn from(device: &TrustedDevice) -> Self {
        Self {
            id: device.id,
            browser: device.browser.clone(),
            os: device.os.clone(),
            device_class: device.device_class.clone(),
            created_at: device.created_at,
            last_used: device.last_used,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}
