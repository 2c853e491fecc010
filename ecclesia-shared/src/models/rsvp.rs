/// Event RSVPs: one response per member per event
///
/// Headcount for capacity purposes is each attending member plus their
/// guests, at most [`MAX_GUESTS`] per response. The capacity check and the upsert run in one transaction with
/// the event row locked, so concurrent responses cannot overbook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::event::{Event, EventError, EVENT_COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rsvp_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Attending,
    Maybe,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rsvp {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub status: RsvpStatus,
    pub guests: i32,
    pub note: Option<String>,
    pub responded_at: DateTime<Utc>,
}

/// RSVP joined with the responding member, for the admin list
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RsvpWithMember {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: RsvpStatus,
    pub guests: i32,
    pub note: Option<String>,
    pub responded_at: DateTime<Utc>,
}

/// Active member attending an event, for reminder fan-out
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Attendee {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Response counts for one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RsvpCounts {
    pub attending: i64,
    pub maybe: i64,
    pub declined: i64,
    /// Attending members plus their guests
    pub headcount: i64,
}

/// Guests one member may bring; the column carries the same CHECK
pub const MAX_GUESTS: i32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RsvpInput {
    pub status: RsvpStatus,
    #[serde(default)]
    #[validate(range(min = 0, max = 20, message = "Guests must be between 0 and 20"))]
    pub guests: i32,
    #[validate(length(max = 500, message = "Note must be at most 500 characters"))]
    pub note: Option<String>,
}

impl RsvpInput {
    /// Headcount this response adds when attending
    pub fn headcount(&self) -> i64 {
        match self.status {
            RsvpStatus::Attending => 1 + i64::from(self.guests.max(0)),
            RsvpStatus::Maybe | RsvpStatus::Declined => 0,
        }
    }
}

/// Checks that `requested` places fit; the error carries the places left
pub fn remaining_after(capacity: Option<i32>, others_headcount: i64, requested: i64) -> Result<(), i64> {
    match capacity {
        None => Ok(()),
        Some(cap) => {
            let remaining = i64::from(cap) - others_headcount;
            if requested <= remaining {
                Ok(())
            } else {
                Err(remaining.max(0))
            }
        }
    }
}

impl Rsvp {
    /// Records or replaces a member's response
    ///
    /// # Errors
    ///
    /// - [`EventError::Invalid`] when guests fall outside `0..=MAX_GUESTS`
    /// - [`EventError::NotFound`] when the event does not exist in the organization
    /// - [`EventError::Closed`] when the event is cancelled, completed or already started
    /// - [`EventError::CapacityExceeded`] when attending would overbook the event
    pub async fn upsert(
        pool: &PgPool,
        organization_id: Uuid,
        event_id: Uuid,
        user_id: Uuid,
        input: RsvpInput,
    ) -> Result<Self, EventError> {
        input.validate()?;

        let mut tx = pool.begin().await?;

        let query = format!(
            "SELECT {} FROM events WHERE id = $1 AND organization_id = $2 FOR UPDATE",
            EVENT_COLUMNS
        );
        let event = sqlx::query_as::<_, Event>(&query)
            .bind(event_id)
            .bind(organization_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(EventError::NotFound)?;

        if !event.is_open(Utc::now()) {
            return Err(EventError::Closed);
        }

        if input.status == RsvpStatus::Attending && event.capacity.is_some() {
            let others: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(1 + guests::BIGINT), 0)::BIGINT
                FROM event_rsvps
                WHERE event_id = $1 AND status = 'attending' AND user_id <> $2
                "#,
            )
            .bind(event_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            remaining_after(event.capacity, others, input.headcount())
                .map_err(|remaining| EventError::CapacityExceeded { remaining })?;
        }

        let rsvp = sqlx::query_as::<_, Rsvp>(
            r#"
            INSERT INTO event_rsvps (event_id, user_id, status, guests, note)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id, user_id) DO UPDATE
            SET status = EXCLUDED.status, guests = EXCLUDED.guests,
                note = EXCLUDED.note, responded_at = NOW()
            RETURNING event_id, user_id, status, guests, note, responded_at
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(input.status)
        .bind(input.guests)
        .bind(input.note.filter(|n| !n.trim().is_empty()))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rsvp)
    }

    /// The member's own response, if any
    pub async fn find(
        pool: &PgPool,
        event_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Rsvp>(
            "SELECT event_id, user_id, status, guests, note, responded_at
             FROM event_rsvps WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// All responses for an event with member names
    pub async fn list_for_event(
        pool: &PgPool,
        event_id: Uuid,
    ) -> Result<Vec<RsvpWithMember>, sqlx::Error> {
        sqlx::query_as::<_, RsvpWithMember>(
            r#"
            SELECT r.user_id, u.first_name, u.last_name, u.email,
                   r.status, r.guests, r.note, r.responded_at
            FROM event_rsvps r
            JOIN users u ON u.id = r.user_id
            WHERE r.event_id = $1
            ORDER BY r.status, u.last_name, u.first_name
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    pub async fn counts(pool: &PgPool, event_id: Uuid) -> Result<RsvpCounts, sqlx::Error> {
        sqlx::query_as::<_, RsvpCounts>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'attending') AS attending,
                COUNT(*) FILTER (WHERE status = 'maybe') AS maybe,
                COUNT(*) FILTER (WHERE status = 'declined') AS declined,
                COALESCE(SUM(1 + guests::BIGINT) FILTER (WHERE status = 'attending'), 0)::BIGINT AS headcount
            FROM event_rsvps
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(pool)
        .await
    }

    /// Whether anyone has responded to the event at all
    pub async fn any_for_event(pool: &PgPool, event_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM event_rsvps WHERE event_id = $1)")
            .bind(event_id)
            .fetch_one(pool)
            .await
    }

    /// Active members attending the event
    pub async fn attendees(pool: &PgPool, event_id: Uuid) -> Result<Vec<Attendee>, sqlx::Error> {
        sqlx::query_as::<_, Attendee>(
            r#"
            SELECT u.id AS user_id, u.email, u.first_name, u.last_name
            FROM event_rsvps r
            JOIN users u ON u.id = r.user_id
            WHERE r.event_id = $1
              AND r.status = 'attending'
              AND u.account_status = 'active'
            ORDER BY u.last_name, u.first_name
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
    }
}
