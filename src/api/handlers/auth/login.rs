//! Registration, password login, and the one-time-code exchange.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::auth::flow::{Authenticator, LoginOutcome};
use crate::auth::store::Role;

use super::types::{
    ChallengeResponse, LoginRequest, MIN_PASSWORD_LENGTH, RegisterRequest, SessionResponse,
    UserResponse, VerifyOtpRequest, valid_email,
};
use super::{auth_failure, bad_request, client_info, remember_cookie, remember_token_cookie};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input or address already registered")
    ),
    tag = "auth"
)]
pub async fn register(
    authenticator: Extension<Arc<Authenticator>>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if !valid_email(&request.email) {
        return bad_request("Invalid email address");
    }
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return bad_request("Password must be at least 8 characters");
    }
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return bad_request("Name is required");
    }

    match authenticator
        .register(
            &request.email,
            request.first_name.trim(),
            request.last_name.trim(),
            Role::Member,
            &request.password,
        )
        .await
    {
        Ok(Some(account)) => {
            (StatusCode::CREATED, Json(UserResponse::from(&account))).into_response()
        }
        Ok(None) => bad_request("Address already registered"),
        Err(error) => auth_failure(error),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Trusted device; session issued", body = SessionResponse),
        (status = 202, description = "Code challenge started", body = ChallengeResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    authenticator: Extension<Arc<Authenticator>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    if !valid_email(&request.email) || request.password.is_empty() {
        return bad_request("Email and password are required");
    }

    let client = client_info(&headers);
    let remember_token = remember_token_cookie(&headers);

    match authenticator
        .login(
            &request.email,
            &request.password,
            remember_token.as_deref(),
            &client,
        )
        .await
    {
        Ok(LoginOutcome::Session { account, token }) => (
            StatusCode::OK,
            Json(SessionResponse {
                token,
                user: UserResponse::from(&account),
            }),
        )
            .into_response(),
        Ok(LoginOutcome::CodeRequired { pre_auth_token }) => (
            StatusCode::ACCEPTED,
            Json(ChallengeResponse {
                pre_auth_token,
                message: "Verification code sent".to_string(),
            }),
        )
            .into_response(),
        Err(error) => auth_failure(error),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 401, description = "Invalid code or pre-auth token"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    authenticator: Extension<Arc<Authenticator>>,
    Json(request): Json<VerifyOtpRequest>,
) -> Response {
    let client = client_info(&headers);
    let verified = match authenticator
        .verify_code(
            &request.pre_auth_token,
            &request.code,
            request.remember_device,
            &client,
        )
        .await
    {
        Ok(verified) => verified,
        Err(error) => return auth_failure(error),
    };

    let mut response_headers = HeaderMap::new();
    if let Some(remember) = &verified.remember {
        match remember_cookie(authenticator.config(), &remember.token) {
            Ok(cookie) => {
                response_headers.insert(SET_COOKIE, cookie);
            }
            Err(error) => error!("Failed to build remember cookie: {error}"),
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(SessionResponse {
            token: verified.session_token,
            user: UserResponse::from(&verified.account),
        }),
    )
        .into_response()
}
