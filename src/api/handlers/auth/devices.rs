//! Trusted-device management. Every endpoint requires a bearer session
//! token; claims carry the account id, so callers can only touch their own
//! rows.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::auth::flow::Authenticator;

use super::types::{DeviceResponse, ErrorResponse};
use super::{auth_failure, clear_remember_cookie, require_session};

#[utoipa::path(
    get,
    path = "/v1/auth/devices",
    responses(
        (status = 200, description = "Devices for the account", body = [DeviceResponse]),
        (status = 401, description = "Missing or invalid session token")
    ),
    tag = "auth"
)]
pub async fn list_devices(
    headers: HeaderMap,
    authenticator: Extension<Arc<Authenticator>>,
) -> Response {
    let claims = match require_session(&authenticator, &headers) {
        Ok(claims) => claims,
        Err(response) => return response,
    };
    match authenticator.list_devices(claims.sub).await {
        Ok(devices) => {
            let body: Vec<DeviceResponse> = devices.iter().map(DeviceResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(error) => auth_failure(error),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/devices/{device_id}",
    params(("device_id" = Uuid, Path, description = "Device to revoke")),
    responses(
        (status = 204, description = "Device revoked"),
        (status = 404, description = "No such device for this account"),
        (status = 401, description = "Missing or invalid session token")
    ),
    tag = "auth"
)]
pub async fn delete_device(
    headers: HeaderMap,
    authenticator: Extension<Arc<Authenticator>>,
    Path(device_id): Path<Uuid>,
) -> Response {
    let claims = match require_session(&authenticator, &headers) {
        Ok(claims) => claims,
        Err(response) => return response,
    };
    match authenticator.revoke_device(claims.sub, device_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("No such device")),
        )
            .into_response(),
        Err(error) => auth_failure(error),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/devices",
    responses(
        (status = 204, description = "All devices revoked and cookie cleared"),
        (status = 401, description = "Missing or invalid session token")
    ),
    tag = "auth"
)]
pub async fn delete_all_devices(
    headers: HeaderMap,
    authenticator: Extension<Arc<Authenticator>>,
) -> Response {
    let claims = match require_session(&authenticator, &headers) {
        Ok(claims) => claims,
        Err(response) => return response,
    };
    if let Err(error) = authenticator.revoke_all_devices(claims.sub).await {
        return auth_failure(error);
    }

    // The caller's own remember cookie is now useless; clear it too.
    let mut response_headers = HeaderMap::new();
    match clear_remember_cookie(authenticator.config()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(error) => error!("Failed to build clearing cookie: {error}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
