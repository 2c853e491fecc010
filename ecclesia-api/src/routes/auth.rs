/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register a member of an existing church
/// - `POST /v1/auth/login` - Sign in; issues a fresh session cookie
/// - `POST /v1/auth/logout` - End the session
/// - `GET /v1/auth/verify?token=` - Confirm the email address
/// - `GET /v1/auth/me` - The signed-in member
///
/// New accounts start `pending` and become `active` once the emailed
/// verification link is followed.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{created, done, ok, ok_with_message, ApiResponse},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use ecclesia_shared::{
    auth::{
        middleware::{CurrentUser, SessionContext},
        password,
        session::SessionData,
        token::{generate_verification_token, hash_token, is_valid_token},
    },
    mail::{render_html, OutgoingEmail},
    models::{
        activity::Activity,
        email_log::{EmailKind, EmailLog, EmailStatus, NewEmailLog},
        hierarchy::{Hierarchy, HierarchySelection},
        organization::Organization,
        user::{AccountStatus, CreateUser, RoleLevel, User},
    },
    validation::cross_field_error,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const VERIFICATION_SUBJECT: &str = "Confirm your email address";

const VERIFICATION_TEMPLATE: &str = r#"<html><body>
<p>Dear {{first_name}},</p>
<p>Welcome to {{church}}. Please confirm your email address to activate your account:</p>
<p><a href="{{link}}">Confirm my email</a></p>
<p>If you did not register, you can ignore this message.</p>
</body></html>"#;

/// Register request
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "known_gender"))]
pub struct RegisterRequest {
    /// Slug of the church being joined
    #[validate(length(min = 1, max = 100, message = "Please choose your church"))]
    pub church: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Checked against the password policy after field validation
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,

    #[validate(length(max = 100, message = "Other names must be at most 100 characters"))]
    pub other_names: Option<String>,

    #[validate(length(max = 30, message = "Phone must be at most 30 characters"))]
    pub phone: Option<String>,

    pub gender: Option<String>,

    /// Province and diocese codes, then free-form lower levels
    #[serde(flatten)]
    pub hierarchy: HierarchySelection,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,

    /// Whether the verification email went out
    pub verification_sent: bool,

    /// Only in development, so the flow can be finished without a mailbox
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: RoleLevel,
    pub theme: String,

    /// Where the client should land next
    pub redirect: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub role_label: &'static str,
    pub church: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_gender(value: Option<String>) -> Option<String> {
    blank_to_none(value).map(|g| g.to_ascii_lowercase())
}

fn known_gender(req: &RegisterRequest) -> Result<(), ValidationError> {
    match normalize_gender(req.gender.clone()).as_deref() {
        None | Some("male") | Some("female") => Ok(()),
        Some(_) => Err(cross_field_error("gender", "Gender must be male or female")),
    }
}

/// Register a member
///
/// The hierarchy chain, the user row and its verification token are written
/// in one transaction. The verification email is sent after commit; a
/// delivery failure is logged and does not undo the registration.
///
/// # Errors
///
/// - `422`: validation failed (fields, password policy, unknown province/diocese)
/// - `403`: the church is not accepting registrations or is full
/// - `404`: unknown church
/// - `409`: email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<RegisterResponse>>)> {
    req.validate()?;
    password::validate_password_strength(&req.password)
        .map_err(|e| ApiError::field("password", e))?;
    let gender = normalize_gender(req.gender);

    let church = Organization::find_by_slug(&state.db, req.church.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("Church not found".to_string()))?;

    let members = Organization::count_users(&state.db, church.id).await?;
    if !church.has_capacity(members) {
        return Err(ApiError::forbidden(
            "This church is not accepting new registrations at the moment",
        ));
    }

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    let password_hash = password::hash_password(&req.password)?;
    let (token, token_hash) = generate_verification_token();

    let mut tx = state.db.begin().await?;
    let hierarchy = Hierarchy::ensure_chain(&mut *tx, &req.hierarchy).await?;
    let user = User::create(
        &mut *tx,
        CreateUser {
            organization_id: church.id,
            email: req.email,
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            other_names: blank_to_none(req.other_names),
            phone: blank_to_none(req.phone),
            gender,
            role_level: RoleLevel::Member,
            account_status: AccountStatus::Pending,
            hierarchy,
            verification_token_hash: Some(token_hash),
        },
    )
    .await?;
    tx.commit().await?;

    info!(user_id = %user.id, organization_id = %church.id, "Member registered");

    let link = state.public_url(&format!("/v1/auth/verify?token={}", token));
    let verification_sent = send_verification(&state, &user, &church.name, &link).await;

    Activity::record(
        &state.db,
        Some(user.id),
        Some(church.id),
        "register",
        json!({ "verification_sent": verification_sent }),
    )
    .await;

    Ok(created(
        "Registration received. Check your email to activate your account.",
        RegisterResponse {
            user_id: user.id,
            verification_sent,
            verification_url: state.config.is_development().then_some(link),
        },
    ))
}

/// Sends the verification email and logs the attempt; true when sent
async fn send_verification(state: &AppState, user: &User, church: &str, link: &str) -> bool {
    let vars = HashMap::from([
        ("first_name".to_string(), user.first_name.clone()),
        ("church".to_string(), church.to_string()),
        ("link".to_string(), link.to_string()),
    ]);
    let email = OutgoingEmail::new(
        user.email.clone(),
        VERIFICATION_SUBJECT,
        render_html(VERIFICATION_TEMPLATE, &vars),
    )
    .with_name(user.full_name())
    .with_text(format!("Confirm your email address: {}", link));

    let result = state.mailer.send(&email).await;
    let (status, provider_message_id, error) = match &result {
        Ok(id) => (EmailStatus::Sent, id.clone(), None),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Verification email failed");
            (EmailStatus::Failed, None, Some(e.to_string()))
        }
    };

    let log = NewEmailLog {
        organization_id: Some(user.organization_id),
        campaign_id: None,
        event_id: None,
        user_id: Some(user.id),
        kind: EmailKind::Verification,
        recipient_email: user.email.clone(),
        subject: VERIFICATION_SUBJECT.to_string(),
        status,
        provider_message_id,
        error,
    };
    if let Err(e) = EmailLog::insert(&state.db, log).await {
        warn!(user_id = %user.id, error = %e, "Failed to log verification email");
    }

    result.is_ok()
}

/// Sign in
///
/// Unknown email and wrong password give the same 401. Accounts that are
/// not active get a 403 explaining why.
pub async fn login(
    State(state): State<AppState>,
    session: SessionContext,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<LoginResponse>>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "Failed sign-in attempt");
        return Err(invalid());
    }

    if let Some(refusal) = user.account_status.login_refusal() {
        return Err(ApiError::forbidden(refusal));
    }

    session.login(SessionData::for_user(&user)).await;
    User::update_last_login(&state.db, user.id).await?;

    Activity::record(
        &state.db,
        Some(user.id),
        Some(user.organization_id),
        "login",
        json!({}),
    )
    .await;
    info!(user_id = %user.id, "User signed in");

    Ok(ok_with_message(
        "Welcome back",
        LoginResponse {
            user_id: user.id,
            display_name: user.full_name(),
            role: user.role_level,
            theme: user.theme.clone(),
            redirect: "/v1/dashboard",
        },
    ))
}

/// End the session; succeeds even without one
pub async fn logout(
    State(state): State<AppState>,
    session: SessionContext,
) -> Json<ApiResponse<()>> {
    if let Some(identity) = session.identity().await {
        Activity::record(
            &state.db,
            Some(identity.user_id),
            Some(identity.organization_id),
            "logout",
            json!({}),
        )
        .await;
    }

    session.logout().await;
    done("You have been signed out")
}

/// Consume an email verification token
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let invalid = || ApiError::BadRequest("This verification link is invalid or has already been used".to_string());

    if !is_valid_token(&query.token) {
        return Err(invalid());
    }

    let user = User::mark_email_verified(&state.db, &hash_token(&query.token))
        .await?
        .ok_or_else(invalid)?;

    info!(user_id = %user.id, "Email verified");
    Activity::record(
        &state.db,
        Some(user.id),
        Some(user.organization_id),
        "email_verified",
        json!({ "status": user.account_status.as_str() }),
    )
    .await;

    Ok(done("Your email address is confirmed. You can now sign in."))
}

/// The signed-in member
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ApiResponse<MeResponse>>> {
    let user = User::find_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let church = Organization::find_by_id(&state.db, user.organization_id)
        .await?
        .map(|o| o.name);

    Ok(ok(MeResponse {
        role_label: user.role_level.label(),
        church,
        user,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecclesia_shared::validation::has_field;

    #[test]
    fn test_register_request_flattens_hierarchy() {
        let req: RegisterRequest = serde_json::from_value(json!({
            "church": "st-peters",
            "email": "ada@example.org",
            "password": "Harvest2024",
            "first_name": "Ada",
            "last_name": "Obi",
            "province": "lagos",
            "diocese": "lagos-west",
            "parish": "St Peter's"
        }))
        .unwrap();

        assert_eq!(req.hierarchy.province, "lagos");
        assert_eq!(req.hierarchy.parish.as_deref(), Some("St Peter's"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_register_request_validation() {
        let req: RegisterRequest = serde_json::from_value(json!({
            "church": "",
            "email": "not-an-email",
            "password": "x",
            "first_name": "",
            "last_name": "Obi",
            "province": "lagos",
            "diocese": "lagos-west"
        }))
        .unwrap();

        let err = ApiError::from(req.validate().unwrap_err());
        match err {
            ApiError::ValidationError(details) => {
                let fields: Vec<_> = details.iter().map(|d| d.field.as_str()).collect();
                assert_eq!(fields, vec!["church", "email", "first_name"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_gender_normalization() {
        assert_eq!(normalize_gender(None), None);
        assert_eq!(normalize_gender(Some("  ".into())), None);
        assert_eq!(normalize_gender(Some("Female".into())).as_deref(), Some("female"));
    }

    #[test]
    fn test_unknown_gender_rejected() {
        let req: RegisterRequest = serde_json::from_value(json!({
            "church": "st-peters",
            "email": "ada@example.org",
            "password": "Harvest2024",
            "first_name": "Ada",
            "last_name": "Obi",
            "gender": "unknown",
            "province": "lagos",
            "diocese": "lagos-west"
        }))
        .unwrap();

        let err = req.validate().unwrap_err();
        assert!(has_field(&err, "gender"));
    }
}
