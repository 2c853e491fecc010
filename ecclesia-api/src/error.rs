/// Error handling for the API server
///
/// Every handler returns [`ApiResult`]. Errors render as the JSON envelope
///
/// ```json
/// { "success": false, "message": "...", "error": "validation_error",
///   "errors": [{ "field": "email", "message": "..." }],
///   "redirect": "/access-denied?reason=out_of_scope" }
/// ```
///
/// where `errors` appears only for validation failures and `redirect` only
/// for authorization failures. Internal errors are logged; their raw message
/// reaches the client only when development mode is switched on with
/// [`expose_internal_errors`].
///
/// # Example
///
/// ```no_run
/// use ecclesia_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::{json, Value};
///
/// async fn handler(name: Option<String>) -> ApiResult<Json<Value>> {
///     let name = name.ok_or_else(|| ApiError::field("name", "Name is required"))?;
///     Ok(Json(json!({ "success": true, "data": name })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ecclesia_shared::auth::authorization::AuthzError;
use ecclesia_shared::auth::middleware::AuthError;
use ecclesia_shared::auth::password::PasswordError;
use ecclesia_shared::mail::MailError;
use ecclesia_shared::models::campaign::CampaignError;
use ecclesia_shared::models::event::EventError;
use ecclesia_shared::models::hierarchy::HierarchyError;
use ecclesia_shared::models::profile::ProfileError;
use ecclesia_shared::validation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

static EXPOSE_INTERNAL: AtomicBool = AtomicBool::new(false);

/// Switches raw internal error messages on (development) or off
pub fn expose_internal_errors(enabled: bool) {
    EXPOSE_INTERNAL.store(enabled, Ordering::Relaxed);
}

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403), with the access-denied reason code
    Forbidden { message: String, reason: &'static str },

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. duplicate email
    Conflict(String),

    /// Unprocessable entity (422), field-level validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,

    /// Human-readable error message
    pub message: String,

    /// Error code (e.g. "bad_request", "forbidden")
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationErrorDetail>>,

    /// Where a browser should go next (authorization failures)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl ApiError {
    /// Single-field validation error
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            reason: "forbidden",
        }
    }
}

/// Access-denied page for a reason code
pub fn access_denied_redirect(reason: &str) -> String {
    format!("/access-denied?reason={}", reason)
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut errors = None;
        let mut redirect = None;

        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden { message, reason } => {
                redirect = Some(access_denied_redirect(reason));
                (StatusCode::FORBIDDEN, "forbidden", message)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::ValidationError(details) => {
                let message = match details.as_slice() {
                    [only] => only.message.clone(),
                    _ => "Please correct the highlighted fields".to_string(),
                };
                errors = Some(details);
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", message)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                let message = if EXPOSE_INTERNAL.load(Ordering::Relaxed) {
                    msg
                } else {
                    "An internal error occurred".to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: error_code.to_string(),
            errors,
            redirect,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                match db_err.constraint() {
                    Some(c) if c.contains("email") => {
                        ApiError::Conflict("An account with this email already exists".to_string())
                    }
                    Some(c) if c.contains("slug") => {
                        ApiError::Conflict("A church with this slug already exists".to_string())
                    }
                    Some(c) => ApiError::Conflict(format!("Constraint violation: {}", c)),
                    None => ApiError::Conflict("Record already exists".to_string()),
                }
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::Unauthorized(err.to_string()),
            AuthError::SessionUnavailable => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden {
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::Validation { field, message, .. } => ApiError::field(field, message),
            ProfileError::EmptySection(section) => {
                ApiError::field(section, ProfileError::EmptySection(section).to_string())
            }
            ProfileError::NotFound => ApiError::NotFound(err.to_string()),
            ProfileError::Database(e) => e.into(),
        }
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Validation { field, message } => ApiError::field(field, message),
            EventError::Invalid(errors) => errors.into(),
            EventError::NotFound => ApiError::NotFound(err.to_string()),
            EventError::Closed | EventError::CapacityExceeded { .. } => {
                ApiError::Conflict(err.to_string())
            }
            EventError::Database(e) => e.into(),
        }
    }
}

impl From<CampaignError> for ApiError {
    fn from(err: CampaignError) -> Self {
        match err {
            CampaignError::Validation { field, message } => ApiError::field(field, message),
            CampaignError::Invalid(errors) => errors.into(),
            CampaignError::NotFound => ApiError::NotFound(err.to_string()),
            CampaignError::NotDraft | CampaignError::NoRecipients => {
                ApiError::Conflict(err.to_string())
            }
            CampaignError::Database(e) => e.into(),
        }
    }
}

impl From<HierarchyError> for ApiError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::UnknownProvince(_) => ApiError::field("province", err.to_string()),
            HierarchyError::UnknownDiocese { .. } => ApiError::field("diocese", err.to_string()),
            HierarchyError::MissingParent { child, .. } => ApiError::field(child, err.to_string()),
            HierarchyError::Database(e) => e.into(),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        ApiError::ServiceUnavailable(format!("Email delivery failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = validation::field_errors(&errors)
            .into_iter()
            .map(|e| ValidationErrorDetail {
                field: e.field,
                message: e.message,
            })
            .collect();
        ApiError::ValidationError(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Member not found".to_string());
        assert_eq!(err.to_string(), "Not found: Member not found");
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ApiError::BadRequest(String::new()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthorized(String::new()), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("no"), StatusCode::FORBIDDEN),
            (ApiError::NotFound(String::new()), StatusCode::NOT_FOUND),
            (ApiError::Conflict(String::new()), StatusCode::CONFLICT),
            (ApiError::field("email", "bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::InternalError(String::new()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let response = ApiError::field("email", "Email is required").into_response();
        let json = body_json(response).await;

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "validation_error");
        assert_eq!(json["message"], "Email is required");
        assert_eq!(json["errors"][0]["field"], "email");
        assert!(json.get("redirect").is_none());
    }

    #[tokio::test]
    async fn test_authorization_error_carries_redirect() {
        let response = ApiError::from(AuthzError::OutOfScope).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let json = body_json(response).await;
        assert_eq!(json["redirect"], "/access-denied?reason=out_of_scope");
        assert_eq!(json["message"], "This member is outside your jurisdiction");
    }

    #[test]
    fn test_domain_error_mapping() {
        assert!(matches!(
            ApiError::from(ProfileError::EmptySection("employment")),
            ApiError::ValidationError(_)
        ));
        assert!(matches!(
            ApiError::from(EventError::CapacityExceeded { remaining: 2 }),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(CampaignError::NoRecipients),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(HierarchyError::UnknownProvince("x".into())),
            ApiError::ValidationError(_)
        ));
        assert!(matches!(
            ApiError::from(sqlx::Error::RowNotFound),
            ApiError::NotFound(_)
        ));
    }
}
