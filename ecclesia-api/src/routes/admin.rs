/// Platform administration (super administrators)
///
/// # Endpoints
///
/// - `GET /v1/admin/churches` - Every church with its member count
/// - `POST /v1/admin/churches` - Provision a church
/// - `GET /v1/admin/churches/:id` - One church
/// - `PUT /v1/admin/churches/:id` - Update name, contact or member limit
/// - `PUT /v1/admin/churches/:id/subscription` - Change subscription state

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{created, ok, ok_with_message, ApiResponse},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use ecclesia_shared::{
    auth::{authorization::require_super_admin, middleware::CurrentUser},
    models::{
        activity::Activity,
        organization::{
            CreateOrganization, Organization, OrganizationSummary, SubscriptionStatus,
            UpdateOrganization,
        },
    },
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub async fn list_churches(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ApiResponse<Vec<OrganizationSummary>>>> {
    require_super_admin(&identity)?;
    Ok(ok(Organization::list(&state.db).await?))
}

pub async fn create_church(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(input): Json<CreateOrganization>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Organization>>)> {
    require_super_admin(&identity)?;
    let input = input.normalized();
    input.validate()?;

    let church = Organization::create(&state.db, input).await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(church.id),
        "church_created",
        json!({ "name": church.name, "slug": church.slug }),
    )
    .await;
    info!(organization_id = %church.id, slug = %church.slug, "Church provisioned");

    Ok(created("Church created", church))
}

pub async fn get_church(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<OrganizationSummary>>> {
    require_super_admin(&identity)?;

    let organization = Organization::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Church not found".to_string()))?;
    let user_count = Organization::count_users(&state.db, id).await?;

    Ok(ok(OrganizationSummary {
        organization,
        user_count,
    }))
}

pub async fn update_church(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateOrganization>,
) -> ApiResult<Json<ApiResponse<Organization>>> {
    require_super_admin(&identity)?;
    let input = input.normalized();
    input.validate()?;

    let church = Organization::update(&state.db, id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Church not found".to_string()))?;

    Ok(ok_with_message("Church updated", church))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubscriptionRequest {
    pub status: SubscriptionStatus,
    #[validate(range(min = 0, message = "Member limit cannot be negative"))]
    pub max_users: Option<i32>,
}

pub async fn update_subscription(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SubscriptionRequest>,
) -> ApiResult<Json<ApiResponse<Organization>>> {
    require_super_admin(&identity)?;
    req.validate()?;

    let church = Organization::update_subscription(&state.db, id, req.status, req.max_users)
        .await?
        .ok_or_else(|| ApiError::NotFound("Church not found".to_string()))?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(church.id),
        "subscription_changed",
        json!({ "status": church.subscription_status.as_str(), "max_users": church.max_users }),
    )
    .await;
    info!(
        organization_id = %church.id,
        status = church.subscription_status.as_str(),
        "Subscription updated"
    );

    Ok(ok_with_message("Subscription updated", church))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecclesia_shared::validation::field_errors;

    fn church(name: &str) -> CreateOrganization {
        CreateOrganization {
            name: name.to_string(),
            slug: None,
            contact_email: None,
            max_users: 100,
            province_id: None,
            diocese_id: None,
        }
    }

    fn failing_fields(input: CreateOrganization) -> Vec<String> {
        match input.normalized().validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e).into_iter().map(|f| f.field).collect(),
        }
    }

    #[test]
    fn test_church_validation() {
        assert!(failing_fields(church("St. Peter's Cathedral")).is_empty());
        assert_eq!(failing_fields(church("   ")), vec!["name"]);

        let mut negative = church("All Saints");
        negative.max_users = -1;
        assert_eq!(failing_fields(negative), vec!["max_users"]);

        let mut bad_email = church("All Saints");
        bad_email.contact_email = Some("office.example.org".to_string());
        assert_eq!(failing_fields(bad_email), vec!["contact_email"]);

        let mut blank_email = church("All Saints");
        blank_email.contact_email = Some("  ".to_string());
        assert!(failing_fields(blank_email).is_empty());
    }

    #[test]
    fn test_church_update_validation() {
        let blank_name = UpdateOrganization {
            name: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(blank_name.normalized().validate().is_err());

        let limit_only = UpdateOrganization {
            max_users: Some(250),
            ..Default::default()
        };
        assert!(limit_only.normalized().validate().is_ok());
    }

    #[test]
    fn test_subscription_request_parses() {
        let req: SubscriptionRequest =
            serde_json::from_value(json!({ "status": "past_due" })).unwrap();
        assert_eq!(req.status, SubscriptionStatus::PastDue);
        assert!(req.max_users.is_none());
        assert!(req.validate().is_ok());

        let negative: SubscriptionRequest =
            serde_json::from_value(json!({ "status": "active", "max_users": -5 })).unwrap();
        assert!(negative.validate().is_err());
    }
}
