//! HTTP surface for the credential and session lifecycle.

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
    },
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use crate::auth::flow::{Authenticator, ClientInfo};
use crate::auth::token::Claims;

pub(crate) mod devices;
pub(crate) mod login;
pub(crate) mod reset;
pub(crate) mod types;

pub(crate) use devices::{delete_all_devices, delete_device, list_devices};
pub(crate) use login::{login, register, verify_otp};
pub(crate) use reset::{forgot_password, reset_password};

use types::ErrorResponse;

const REMEMBER_COOKIE_NAME: &str = "remember_token";

/// Map a flow error onto a response. Transient failures are logged here and
/// surfaced as an opaque 500; everything else carries its own message.
pub(super) fn auth_failure(error: AuthError) -> Response {
    let status = match &error {
        AuthError::InvalidCredentials
        | AuthError::InvalidCode
        | AuthError::UntrustedDevice
        | AuthError::MalformedToken => StatusCode::UNAUTHORIZED,
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::ResetTokenInvalid => StatusCode::BAD_REQUEST,
        AuthError::Transient(source) => {
            error!("Auth flow failed: {source:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            )
                .into_response();
        }
    };
    (status, Json(ErrorResponse::new(&error.to_string()))).into_response()
}

pub(super) fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
}

/// Throttle identity and device hints for the presenting client. Proxy
/// headers win over nothing at all; absent both, every caller shares the
/// `unknown` bucket.
pub(super) fn client_info(headers: &HeaderMap) -> ClientInfo {
    let address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("unknown")
        .to_string();
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    ClientInfo {
        address,
        user_agent,
    }
}

pub(super) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

/// Verify the bearer session token or produce the 401 the caller returns.
pub(super) fn require_session(
    authenticator: &Authenticator,
    headers: &HeaderMap,
) -> Result<Claims, Response> {
    let Some(token) = bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Missing bearer token")),
        )
            .into_response());
    };
    authenticator
        .authenticate_session(&token)
        .map_err(auth_failure)
}

pub(super) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name { Some(value.to_string()) } else { None }
    })
}

pub(super) fn remember_token_cookie(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, REMEMBER_COOKIE_NAME)
}

/// `HttpOnly` remember-device cookie, `Secure` only behind HTTPS.
pub(super) fn remember_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REMEMBER_COOKIE_NAME}={token}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        config.remember_ttl_seconds()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_remember_cookie(
    config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{REMEMBER_COOKIE_NAME}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
