/// Church events and their reminder bookkeeping
///
/// Events belong to an organization and may be tied to a parish. The worker
/// picks up scheduled events starting inside the reminder window whose
/// `reminder_sent` flag is still false.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE events (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id),
///     created_by UUID REFERENCES users(id),
///     parish_id UUID REFERENCES parishes(id),
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     location VARCHAR(255),
///     starts_at TIMESTAMPTZ NOT NULL,
///     ends_at TIMESTAMPTZ,
///     capacity INTEGER,                       -- NULL = unlimited
///     status event_status NOT NULL DEFAULT 'scheduled',
///     reminder_sent BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::models::event::{Event, EventInput};
/// use chrono::{Duration, Utc};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, org: Uuid, admin: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let event = Event::create(&pool, org, admin, EventInput {
///     title: "Harvest Thanksgiving".to_string(),
///     description: None,
///     location: Some("Cathedral grounds".to_string()),
///     starts_at: Utc::now() + Duration::days(7),
///     ends_at: None,
///     capacity: Some(300),
///     parish_id: None,
/// }).await?;
///
/// let due = Event::due_for_reminder(&pool, Duration::hours(24), 50).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::validation::cross_field_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Cancelled,
    Completed,
}

/// Errors raised by event and RSVP operations
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Event not found")]
    NotFound,

    #[error("This event is no longer accepting responses")]
    Closed,

    #[error("Only {remaining} place(s) left for this event")]
    CapacityExceeded { remaining: i64 },

    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Option<Uuid>,
    pub parish_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,

    /// Maximum headcount (attendees plus guests); None = unlimited
    pub capacity: Option<i32>,

    pub status: EventStatus,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Whether RSVPs are still accepted at `now`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Scheduled && self.starts_at > now
    }
}

pub(crate) const EVENT_COLUMNS: &str = "id, organization_id, created_by, parish_id, title, \
     description, location, starts_at, ends_at, capacity, status, reminder_sent, created_at, updated_at";

/// Event form input, used for both create and update
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "ends_after_start"))]
pub struct EventInput {
    #[validate(length(min = 1, max = 255, message = "Title is required (max 255 characters)"))]
    pub title: String,
    pub description: Option<String>,
    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Capacity must be positive"))]
    pub capacity: Option<i32>,
    pub parish_id: Option<Uuid>,
}

fn ends_after_start(input: &EventInput) -> Result<(), ValidationError> {
    match input.ends_at {
        Some(ends_at) if ends_at < input.starts_at => Err(cross_field_error(
            "ends_at",
            "Event cannot end before it starts",
        )),
        _ => Ok(()),
    }
}

impl EventInput {
    /// Trims the form, then checks it
    pub fn validated(self) -> Result<Self, EventError> {
        let input = Self {
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            location: self
                .location
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            ..self
        };
        input.validate()?;
        Ok(input)
    }
}

impl Event {
    /// Creates a scheduled event
    pub async fn create(
        pool: &PgPool,
        organization_id: Uuid,
        created_by: Uuid,
        input: EventInput,
    ) -> Result<Self, EventError> {
        let input = input.validated()?;
        let query = format!(
            r#"
            INSERT INTO events (organization_id, created_by, parish_id, title, description,
                                location, starts_at, ends_at, capacity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );

        let event = sqlx::query_as::<_, Event>(&query)
            .bind(organization_id)
            .bind(created_by)
            .bind(input.parish_id)
            .bind(input.title)
            .bind(input.description)
            .bind(input.location)
            .bind(input.starts_at)
            .bind(input.ends_at)
            .bind(input.capacity)
            .fetch_one(pool)
            .await?;

        Ok(event)
    }

    /// Finds an event, restricted to one organization unless `organization_id` is None
    pub async fn find_by_id(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM events WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Scheduled events that have not started yet, soonest first
    pub async fn list_upcoming(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {} FROM events
            WHERE status = 'scheduled' AND starts_at > NOW()
              AND ($1::uuid IS NULL OR organization_id = $1)
            ORDER BY starts_at
            LIMIT $2
            "#,
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(organization_id)
            .bind(limit.clamp(1, 200))
            .fetch_all(pool)
            .await
    }

    /// Replaces an event's details
    ///
    /// Moving the start time resets `reminder_sent` so the new date gets
    /// its own reminder.
    pub async fn update(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        id: Uuid,
        input: EventInput,
    ) -> Result<Self, EventError> {
        let input = input.validated()?;
        let query = format!(
            r#"
            UPDATE events SET
                title = $3, description = $4, location = $5,
                reminder_sent = reminder_sent AND starts_at = $6,
                starts_at = $6, ends_at = $7, capacity = $8, parish_id = $9,
                updated_at = NOW()
            WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)
              AND status = 'scheduled'
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );

        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .bind(organization_id)
            .bind(input.title)
            .bind(input.description)
            .bind(input.location)
            .bind(input.starts_at)
            .bind(input.ends_at)
            .bind(input.capacity)
            .bind(input.parish_id)
            .fetch_optional(pool)
            .await?
            .ok_or(EventError::NotFound)
    }

    /// Cancels a scheduled event
    pub async fn cancel(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE events SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)
              AND status = 'scheduled'
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Scheduled events starting within `window` that still need a reminder
    pub async fn due_for_reminder(
        pool: &PgPool,
        window: Duration,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            r#"
            SELECT {} FROM events
            WHERE status = 'scheduled'
              AND reminder_sent = FALSE
              AND starts_at > $1
              AND starts_at <= $2
            ORDER BY starts_at
            LIMIT $3
            "#,
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, Event>(&query)
            .bind(now)
            .bind(now + window)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Flags an event's reminder as sent before any mail goes out
    ///
    /// Returns false when the flag was already set, so a reminder is sent
    /// at most once even with several workers.
    pub async fn mark_reminder_sent(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE events SET reminder_sent = TRUE, updated_at = NOW() \
             WHERE id = $1 AND reminder_sent = FALSE",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::has_field;

    fn input() -> EventInput {
        EventInput {
            title: "  Choir Practice ".to_string(),
            description: Some("   ".to_string()),
            location: Some("Chapel".to_string()),
            starts_at: Utc::now() + Duration::days(1),
            ends_at: None,
            capacity: None,
            parish_id: None,
        }
    }

    #[test]
    fn test_validated_trims_and_drops_blanks() {
        let v = input().validated().unwrap();
        assert_eq!(v.title, "Choir Practice");
        assert_eq!(v.description, None);
        assert_eq!(v.location.as_deref(), Some("Chapel"));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut i = input();
        i.ends_at = Some(i.starts_at - Duration::hours(1));
        assert!(matches!(
            i.validated(),
            Err(EventError::Invalid(ref e)) if has_field(e, "ends_at")
        ));
    }

    #[test]
    fn test_blank_title_rejected() {
        let mut i = input();
        i.title = "   ".to_string();
        assert!(matches!(
            i.validated(),
            Err(EventError::Invalid(ref e)) if has_field(e, "title")
        ));
    }

    #[test]
    fn test_capacity_must_be_positive() {
        let mut i = input();
        i.capacity = Some(0);
        assert!(matches!(
            i.validated(),
            Err(EventError::Invalid(ref e)) if has_field(e, "capacity")
        ));
    }

    #[test]
    fn test_is_open() {
        let now = Utc::now();
        let mut event = Event {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            created_by: None,
            parish_id: None,
            title: "Vigil".to_string(),
            description: None,
            location: None,
            starts_at: now + Duration::hours(2),
            ends_at: None,
            capacity: None,
            status: EventStatus::Scheduled,
            reminder_sent: false,
            created_at: now,
            updated_at: now,
        };
        assert!(event.is_open(now));

        event.status = EventStatus::Cancelled;
        assert!(!event.is_open(now));

        event.status = EventStatus::Scheduled;
        event.starts_at = now - Duration::hours(1);
        assert!(!event.is_open(now));
    }
}
