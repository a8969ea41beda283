//! Password-reset endpoints.
//!
//! `forgot-password` answers with the same body and status for known and
//! unknown addresses.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use crate::auth::flow::Authenticator;

use super::types::{
    ForgotPasswordRequest, MIN_PASSWORD_LENGTH, MessageResponse, ResetPasswordRequest, valid_email,
};
use super::{auth_failure, bad_request};

#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 202, description = "Acknowledged; a link is on its way if the address exists",
         body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    authenticator: Extension<Arc<Authenticator>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Response {
    if !valid_email(&request.email) {
        return bad_request("Invalid email address");
    }
    if let Err(error) = authenticator.request_reset(&request.email).await {
        return auth_failure(error);
    }
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If the address exists, a reset link is on its way".to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password rotated"),
        (status = 400, description = "Invalid, expired, or already-used token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    authenticator: Extension<Arc<Authenticator>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Response {
    if request.password.len() < MIN_PASSWORD_LENGTH {
        return bad_request("Password must be at least 8 characters");
    }
    match authenticator
        .redeem_reset(&request.token, &request.password)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => auth_failure(error),
    }
}
