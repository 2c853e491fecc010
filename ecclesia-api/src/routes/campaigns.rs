/// Email campaigns
///
/// # Endpoints
///
/// - `GET /v1/campaigns` - Recent campaigns of the caller's church
/// - `POST /v1/campaigns` - Create a draft
/// - `GET /v1/campaigns/:id` - Campaign with delivery figures
/// - `POST /v1/campaigns/:id/send` - Queue a draft for delivery
///
/// Administrators only. Sending fans the draft out to one queued log row per
/// recipient inside the sender's jurisdiction; the worker delivers them.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{created, ok, ok_with_message, ApiResponse},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use ecclesia_shared::{
    auth::{authorization::require_admin, middleware::CurrentUser},
    models::{
        activity::Activity,
        campaign::{Campaign, CreateCampaign},
        email_log::DeliveryStats,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ListCampaignsQuery {
    pub limit: Option<i64>,
}

pub async fn list_campaigns(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(query): Query<ListCampaignsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Campaign>>>> {
    require_admin(&identity)?;

    let tenant = identity.scope().organization_id();
    let campaigns = Campaign::list(&state.db, tenant, query.limit.unwrap_or(50)).await?;
    Ok(ok(campaigns))
}

pub async fn create_campaign(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(input): Json<CreateCampaign>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Campaign>>)> {
    require_admin(&identity)?;

    let campaign =
        Campaign::create(&state.db, identity.organization_id, identity.user_id, input).await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(campaign.organization_id),
        "campaign_created",
        json!({ "campaign_id": campaign.id, "subject": campaign.subject }),
    )
    .await;

    Ok(created("Campaign saved as draft", campaign))
}

#[derive(Debug, Serialize)]
pub struct CampaignDetail {
    pub campaign: Campaign,
    pub stats: DeliveryStats,
}

pub async fn get_campaign(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<CampaignDetail>>> {
    require_admin(&identity)?;

    let tenant = identity.scope().organization_id();
    let campaign = Campaign::find(&state.db, tenant, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Campaign not found".to_string()))?;
    let stats = Campaign::stats(&state.db, campaign.id).await?;

    Ok(ok(CampaignDetail { campaign, stats }))
}

pub async fn send_campaign(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Campaign>>> {
    require_admin(&identity)?;

    let scope = identity.scope();
    let filter = scope.to_sql("u", 1);
    let campaign = Campaign::queue(&state.db, scope.organization_id(), id, &filter).await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(campaign.organization_id),
        "campaign_queued",
        json!({ "campaign_id": campaign.id, "recipients": campaign.recipient_count }),
    )
    .await;
    info!(
        campaign_id = %campaign.id,
        recipients = campaign.recipient_count,
        "Campaign queued for delivery"
    );

    Ok(ok_with_message(
        format!("Campaign queued for {} recipients", campaign.recipient_count),
        campaign,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_campaign_payload() {
        let input: CreateCampaign = serde_json::from_value(json!({
            "subject": "Harvest thanksgiving",
            "body_template": "Dear {{first_name}}, join us.",
        }))
        .unwrap();

        assert!(input.event_id.is_none());
        assert!(!input.attendees_only);
    }

    #[test]
    fn test_list_query_parses() {
        let uri: axum::http::Uri = "/v1/campaigns?limit=5".parse().unwrap();
        let Query(query) = Query::<ListCampaignsQuery>::try_from_uri(&uri).unwrap();
        assert_eq!(query.limit, Some(5));
    }
}
