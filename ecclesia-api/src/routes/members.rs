/// Member directory and management
///
/// # Endpoints
///
/// - `GET /v1/members` - Members in the caller's jurisdiction (administrators)
/// - `GET /v1/members/:id` - One member with profile sections
/// - `PUT /v1/members/:id/role` - Change a member's role
/// - `PUT /v1/members/:id/status` - Change a member's account status
///
/// Visibility always comes from the scope resolver: a parish administrator
/// sees their parish, a member sees only themselves. Role and status changes
/// sign the target out everywhere so the new permissions apply at once.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{ok, ok_with_message, ApiResponse},
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use ecclesia_shared::{
    auth::{
        authorization::{check_role_change, check_status_change, require_admin},
        middleware::CurrentUser,
    },
    models::{
        activity::Activity,
        audit::RoleAudit,
        profile::{Employment, FamilyMember, LeadershipRole, MinistryMembership},
        user::{AccountStatus, MemberQuery, RoleLevel, User},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct MemberList {
    pub members: Vec<User>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_members(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(query): Query<MemberQuery>,
) -> ApiResult<Json<ApiResponse<MemberList>>> {
    require_admin(&identity)?;

    let filter = identity.scope().to_sql("u", 1);
    let (members, total) = futures::try_join!(
        User::list_scoped(&state.db, &filter, &query),
        User::count_scoped(&state.db, &filter, &query),
    )?;

    Ok(ok(MemberList {
        members,
        total,
        limit: query
            .limit
            .unwrap_or(MemberQuery::DEFAULT_LIMIT)
            .clamp(1, MemberQuery::MAX_LIMIT),
        offset: query.offset.unwrap_or(0).max(0),
    }))
}

#[derive(Debug, Serialize)]
pub struct MemberDetail {
    pub member: User,
    pub employment: Vec<Employment>,
    pub leadership: Vec<LeadershipRole>,
    pub ministry: Vec<MinistryMembership>,
    pub family: Vec<FamilyMember>,

    /// Administrators only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_history: Option<Vec<RoleAudit>>,
}

pub async fn get_member(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<MemberDetail>>> {
    let filter = identity.scope().to_sql("u", 1);
    let member = User::find_scoped(&state.db, &filter, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let (employment, leadership, ministry, family) = futures::try_join!(
        Employment::list_for_user(&state.db, member.id),
        LeadershipRole::list_for_user(&state.db, member.id),
        MinistryMembership::list_for_user(&state.db, member.id),
        FamilyMember::list_for_user(&state.db, member.id),
    )?;

    let role_history = if identity.role.is_admin() {
        Some(RoleAudit::list_for_user(&state.db, member.id).await?)
    } else {
        None
    };

    Ok(ok(MemberDetail {
        member,
        employment,
        leadership,
        ministry,
        family,
        role_history,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: RoleLevel,
    pub reason: Option<String>,
}

pub async fn change_role(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_admin(&identity)?;

    let target = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    check_role_change(&identity, &target, req.role)?;

    if target.role_level == req.role {
        return Ok(ok_with_message("Role unchanged", target));
    }

    let reason = req
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let old_role = target.role_level;

    let updated = User::change_role(&state.db, identity.user_id, target.id, req.role, reason)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let signed_out = state.sessions.destroy_for_user(updated.id).await;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(updated.organization_id),
        "role_changed",
        json!({
            "target_user_id": updated.id,
            "old_role": old_role,
            "new_role": updated.role_level,
        }),
    )
    .await;
    info!(
        actor_id = %identity.user_id,
        target_user_id = %updated.id,
        sessions_ended = signed_out,
        "Member role updated"
    );

    Ok(ok_with_message(
        format!("Role changed to {}", updated.role_level.label()),
        updated,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: AccountStatus,
}

pub async fn change_status(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    require_admin(&identity)?;

    let target = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    check_status_change(&identity, &target)?;

    let old_status = target.account_status;
    let updated = User::set_status(&state.db, target.id, req.status)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    if !updated.account_status.can_login() {
        state.sessions.destroy_for_user(updated.id).await;
    }

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(updated.organization_id),
        "status_changed",
        json!({
            "target_user_id": updated.id,
            "old_status": old_status.as_str(),
            "new_status": updated.account_status.as_str(),
        }),
    )
    .await;

    Ok(ok_with_message(
        format!("Account is now {}", updated.account_status.as_str()),
        updated,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_query_from_query_string() {
        let uri: axum::http::Uri = "/v1/members?status=pending&role=parish_admin&search=obi&limit=10"
            .parse()
            .unwrap();
        let Query(query) = Query::<MemberQuery>::try_from_uri(&uri).unwrap();

        assert_eq!(query.status, Some(AccountStatus::Pending));
        assert_eq!(query.role, Some(RoleLevel::ParishAdmin));
        assert_eq!(query.search.as_deref(), Some("obi"));
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_change_requests_parse() {
        let req: ChangeRoleRequest =
            serde_json::from_value(json!({ "role": "deanery_admin" })).unwrap();
        assert_eq!(req.role, RoleLevel::DeaneryAdmin);
        assert!(req.reason.is_none());

        let req: ChangeStatusRequest =
            serde_json::from_value(json!({ "status": "suspended" })).unwrap();
        assert_eq!(req.status, AccountStatus::Suspended);

        assert!(serde_json::from_value::<ChangeStatusRequest>(json!({ "status": "deleted" })).is_err());
    }
}
