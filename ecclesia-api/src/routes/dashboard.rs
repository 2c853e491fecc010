/// Role-dependent dashboard
///
/// `GET /v1/dashboard` always returns the caller's own summary, upcoming
/// events and recent activity. Administrators additionally get member counts
/// for their jurisdiction and recent campaigns; super administrators get
/// platform totals.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{ok, profile::profile_completeness, ApiResponse},
};
use axum::{extract::State, Json};
use ecclesia_shared::{
    auth::{
        middleware::CurrentUser,
        scope::{Identity, Scope},
    },
    models::{
        activity::Activity,
        hierarchy::Hierarchy,
        campaign::Campaign,
        event::Event,
        organization::Organization,
        profile::{Employment, FamilyMember, MinistryMembership},
        user::{AccountStatus, MemberQuery, RoleLevel, User},
    },
};
use serde::Serialize;
use sqlx::PgPool;

const UPCOMING_EVENTS: i64 = 5;
const RECENT_ACTIVITY: i64 = 10;
const RECENT_CAMPAIGNS: i64 = 5;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub display_name: String,
    pub role: RoleLevel,
    pub role_label: &'static str,
    pub profile_completeness: u8,
    pub upcoming_events: Vec<Event>,
    pub recent_activity: Vec<Activity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminPanel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformPanel>,
}

/// Member counts inside the administrator's jurisdiction
#[derive(Debug, Default, Serialize)]
pub struct MemberCounts {
    pub total: i64,
    pub active: i64,
    pub pending: i64,
    pub suspended: i64,
    pub inactive: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminPanel {
    /// Name of the hierarchy node the administrator oversees
    pub jurisdiction: Option<String>,
    pub members: MemberCounts,
    pub recent_campaigns: Vec<Campaign>,
    pub church_activity: Vec<Activity>,
}

#[derive(Debug, Serialize)]
pub struct PlatformPanel {
    pub churches: usize,
    pub members: i64,
}

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ApiResponse<DashboardResponse>>> {
    let pool = &state.db;
    let user = User::find_by_id(pool, identity.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let tenant = identity.scope().organization_id();

    let (employment, ministry, family, upcoming_events, recent_activity) = futures::try_join!(
        Employment::list_for_user(pool, user.id),
        MinistryMembership::list_for_user(pool, user.id),
        FamilyMember::list_for_user(pool, user.id),
        Event::list_upcoming(pool, tenant, UPCOMING_EVENTS),
        Activity::recent_for_user(pool, user.id, RECENT_ACTIVITY),
    )?;

    let admin = if identity.role.is_admin() {
        Some(admin_panel(pool, &identity).await?)
    } else {
        None
    };

    let platform = if identity.role.is_super_admin() {
        let churches = Organization::list(pool).await?;
        Some(PlatformPanel {
            members: churches.iter().map(|c| c.user_count).sum(),
            churches: churches.len(),
        })
    } else {
        None
    };

    Ok(ok(DashboardResponse {
        display_name: user.full_name(),
        role: user.role_level,
        role_label: user.role_level.label(),
        profile_completeness: profile_completeness(
            &user,
            employment.len(),
            ministry.len(),
            family.len(),
        ),
        upcoming_events,
        recent_activity,
        admin,
        platform,
    }))
}

async fn admin_panel(pool: &PgPool, identity: &Identity) -> Result<AdminPanel, sqlx::Error> {
    let scope = identity.scope();
    let filter = scope.to_sql("u", 1);
    let tenant = scope.organization_id();

    let count = |status: Option<AccountStatus>| {
        let filter = &filter;
        async move {
            User::count_scoped(
                pool,
                filter,
                &MemberQuery {
                    status,
                    ..Default::default()
                },
            )
            .await
        }
    };

    let (total, active, pending, suspended, inactive) = futures::try_join!(
        count(None),
        count(Some(AccountStatus::Active)),
        count(Some(AccountStatus::Pending)),
        count(Some(AccountStatus::Suspended)),
        count(Some(AccountStatus::Inactive)),
    )?;

    let jurisdiction = match scope {
        Scope::Jurisdiction {
            level,
            node_id: Some(id),
            ..
        } => Hierarchy::name_of(pool, level, id).await?,
        _ => None,
    };

    let recent_campaigns = Campaign::list(pool, tenant, RECENT_CAMPAIGNS).await?;
    let church_activity = Activity::recent_for_organization(pool, identity.organization_id, RECENT_ACTIVITY).await?;

    Ok(AdminPanel {
        jurisdiction,
        members: MemberCounts {
            total,
            active,
            pending,
            suspended,
            inactive,
        },
        recent_campaigns,
        church_activity,
    })
}
