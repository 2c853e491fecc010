/// Church events and RSVPs
///
/// # Endpoints
///
/// - `GET /v1/events` - Upcoming events of the caller's church
/// - `POST /v1/events` - Create an event (administrators)
/// - `GET /v1/events/:id` - Event details with counts and the caller's response
/// - `PUT /v1/events/:id` - Replace event details (administrators)
/// - `DELETE /v1/events/:id` - Cancel an event (administrators)
/// - `POST /v1/events/:id/rsvp` - Respond to an event
/// - `GET /v1/events/:id/rsvps` - All responses (administrators)

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
    auth::{authorization::require_admin, middleware::CurrentUser, scope::Identity},
    models::{
        activity::Activity,
        event::{Event, EventInput},
        rsvp::{Rsvp, RsvpCounts, RsvpInput, RsvpWithMember},
        user::RoleLevel,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsQuery {
    pub limit: Option<i64>,
}

impl ListEventsQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Event>>>> {
    let tenant = identity.scope().organization_id();
    let events = Event::list_upcoming(&state.db, tenant, query.limit()).await?;
    Ok(ok(events))
}

/// Parish administrators may only create events for their own parish
fn resolve_parish(identity: &Identity, requested: Option<Uuid>) -> ApiResult<Option<Uuid>> {
    if identity.role != RoleLevel::ParishAdmin {
        return Ok(requested);
    }

    let own = identity.hierarchy.parish_id;
    match requested {
        None => Ok(own),
        Some(parish) if Some(parish) == own => Ok(own),
        Some(_) => Err(ApiError::forbidden(
            "Parish administrators can only create events for their parish",
        )),
    }
}

pub async fn create_event(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(mut input): Json<EventInput>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Event>>)> {
    require_admin(&identity)?;
    input.parish_id = resolve_parish(&identity, input.parish_id)?;

    let event = Event::create(&state.db, identity.organization_id, identity.user_id, input).await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(event.organization_id),
        "event_created",
        json!({ "event_id": event.id, "title": event.title }),
    )
    .await;
    info!(event_id = %event.id, starts_at = %event.starts_at, "Event created");

    Ok(created("Event created", event))
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    pub event: Event,
    pub counts: RsvpCounts,

    /// The caller's own response, if any
    pub my_rsvp: Option<Rsvp>,
}

pub async fn get_event(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<EventDetail>>> {
    let tenant = identity.scope().organization_id();
    let event = Event::find_by_id(&state.db, tenant, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    let (counts, my_rsvp) = futures::try_join!(
        Rsvp::counts(&state.db, event.id),
        Rsvp::find(&state.db, event.id, identity.user_id),
    )?;

    Ok(ok(EventDetail {
        event,
        counts,
        my_rsvp,
    }))
}

pub async fn update_event(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(mut input): Json<EventInput>,
) -> ApiResult<Json<ApiResponse<Event>>> {
    require_admin(&identity)?;
    input.parish_id = resolve_parish(&identity, input.parish_id)?;

    let tenant = identity.scope().organization_id();
    let event = Event::update(&state.db, tenant, id, input).await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(event.organization_id),
        "event_updated",
        json!({ "event_id": event.id }),
    )
    .await;

    Ok(ok_with_message("Event updated", event))
}

pub async fn cancel_event(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Event>>> {
    require_admin(&identity)?;

    let tenant = identity.scope().organization_id();
    let event = Event::cancel(&state.db, tenant, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found or already cancelled".to_string()))?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(event.organization_id),
        "event_cancelled",
        json!({ "event_id": event.id }),
    )
    .await;
    info!(event_id = %event.id, "Event cancelled");

    Ok(ok_with_message("Event cancelled", event))
}

pub async fn respond(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RsvpInput>,
) -> ApiResult<Json<ApiResponse<Rsvp>>> {
    let rsvp = Rsvp::upsert(
        &state.db,
        identity.organization_id,
        id,
        identity.user_id,
        input,
    )
    .await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(identity.organization_id),
        "event_rsvp",
        json!({ "event_id": id, "status": rsvp.status, "guests": rsvp.guests }),
    )
    .await;

    Ok(ok_with_message("Response recorded", rsvp))
}

#[derive(Debug, Serialize)]
pub struct RsvpList {
    pub counts: RsvpCounts,
    pub responses: Vec<RsvpWithMember>,
}

pub async fn list_rsvps(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<RsvpList>>> {
    require_admin(&identity)?;

    let tenant = identity.scope().organization_id();
    let event = Event::find_by_id(&state.db, tenant, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    let (counts, responses) = futures::try_join!(
        Rsvp::counts(&state.db, event.id),
        Rsvp::list_for_event(&state.db, event.id),
    )?;

    Ok(ok(RsvpList { counts, responses }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecclesia_shared::models::hierarchy::HierarchyIds;

    fn identity(role: RoleLevel, parish_id: Option<Uuid>) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role,
            hierarchy: HierarchyIds {
                parish_id,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_list_limit_bounds() {
        assert_eq!(ListEventsQuery::default().limit(), DEFAULT_LIST_LIMIT);
        assert_eq!(ListEventsQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(ListEventsQuery { limit: Some(5000) }.limit(), MAX_LIST_LIMIT);
    }

    #[test]
    fn test_parish_admin_defaults_to_own_parish() {
        let parish = Uuid::new_v4();
        let admin = identity(RoleLevel::ParishAdmin, Some(parish));

        assert_eq!(resolve_parish(&admin, None).unwrap(), Some(parish));
        assert_eq!(resolve_parish(&admin, Some(parish)).unwrap(), Some(parish));
        assert!(matches!(
            resolve_parish(&admin, Some(Uuid::new_v4())),
            Err(ApiError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_higher_admins_choose_any_parish() {
        let admin = identity(RoleLevel::DioceseAdmin, None);
        let parish = Uuid::new_v4();

        assert_eq!(resolve_parish(&admin, Some(parish)).unwrap(), Some(parish));
        assert_eq!(resolve_parish(&admin, None).unwrap(), None);
    }

    #[test]
    fn test_rsvp_input_defaults_guests() {
        let input: RsvpInput = serde_json::from_value(json!({ "status": "maybe" })).unwrap();
        assert_eq!(input.guests, 0);
        assert!(input.note.is_none());
    }
}
