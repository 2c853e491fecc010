/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: Health check and the access-denied page
/// - `auth`: Registration, login, logout, email verification
/// - `profile`: The member's own profile and its sections
/// - `dashboard`: Role-dependent landing data
/// - `members`: Member directory and management (administrators)
/// - `hierarchy`: Province/diocese catalogue and lower levels
/// - `events`: Events and RSVPs
/// - `campaigns`: Email campaigns (administrators)
/// - `tracking`: Open/click tracking and the provider webhook
/// - `admin`: Church provisioning (super administrators)
///
/// Successful responses use the [`ApiResponse`] envelope.

use axum::{http::StatusCode, Json};
use serde::Serialize;

pub mod admin;
pub mod auth;
pub mod campaigns;
pub mod dashboard;
pub mod events;
pub mod health;
pub mod hierarchy;
pub mod members;
pub mod profile;
pub mod tracking;

/// Success envelope: `{ "success": true, "message"?: ..., "data"?: ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// 200 with data
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: None,
        data: Some(data),
    })
}

/// 200 with a message and data
pub fn ok_with_message<T: Serialize>(message: impl Into<String>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.into()),
        data: Some(data),
    })
}

/// 200 with a message only
pub fn done(message: impl Into<String>) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        success: true,
        message: Some(message.into()),
        data: None,
    })
}

/// 201 with a message and data
pub fn created<T: Serialize>(
    message: impl Into<String>,
    data: T,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, ok_with_message(message, data))
}
