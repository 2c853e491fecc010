/// Email campaigns
///
/// A campaign is drafted by an administrator, then queued: queuing fans out
/// one `email_logs` row per active member inside the administrator's scope
/// (optionally only those attending the linked event). The worker sends the
/// queued rows and finalizes the campaign once none remain.
///
/// Lifecycle: `draft → queued → sending → sent | failed`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_campaigns (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id),
///     event_id UUID REFERENCES events(id),
///     created_by UUID REFERENCES users(id),
///     subject VARCHAR(255) NOT NULL,
///     body_template TEXT NOT NULL,
///     attendees_only BOOLEAN NOT NULL DEFAULT FALSE,
///     status campaign_status NOT NULL DEFAULT 'draft',
///     recipient_count INTEGER NOT NULL DEFAULT 0,
///     queued_at TIMESTAMPTZ,
///     completed_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::email_log::{DeliveryStats, EmailLog};
use crate::{auth::scope::ScopeFilter, validation::cross_field_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Queued,
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign has already been sent")]
    NotDraft,

    #[error("No recipients match this campaign")]
    NoRecipients,

    #[error("Invalid campaign: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub subject: String,

    /// Body with `{{placeholder}}` mail-merge fields
    pub body_template: String,

    /// Only members attending `event_id` receive it
    pub attendees_only: bool,

    pub status: CampaignStatus,
    pub recipient_count: i32,
    pub queued_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CAMPAIGN_COLUMNS: &str = "id, organization_id, event_id, created_by, subject, body_template, \
     attendees_only, status, recipient_count, queued_at, completed_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "attendees_need_event"))]
pub struct CreateCampaign {
    #[validate(length(min = 1, max = 255, message = "Subject is required (max 255 characters)"))]
    pub subject: String,
    #[validate(length(min = 1, message = "Message body is required"))]
    pub body_template: String,
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub attendees_only: bool,
}

fn attendees_need_event(input: &CreateCampaign) -> Result<(), ValidationError> {
    if input.attendees_only && input.event_id.is_none() {
        return Err(cross_field_error(
            "attendees_only",
            "Choose an event to send to its attendees",
        ));
    }
    Ok(())
}

impl CreateCampaign {
    /// Trims subject and body, then checks them
    pub fn validated(self) -> Result<Self, CampaignError> {
        let input = Self {
            subject: self.subject.trim().to_string(),
            body_template: self.body_template.trim().to_string(),
            ..self
        };
        input.validate()?;
        Ok(input)
    }
}

impl Campaign {
    /// Creates a draft campaign
    pub async fn create(
        pool: &PgPool,
        organization_id: Uuid,
        created_by: Uuid,
        input: CreateCampaign,
    ) -> Result<Self, CampaignError> {
        let input = input.validated()?;

        if let Some(event_id) = input.event_id {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM events WHERE id = $1 AND organization_id = $2)",
            )
            .bind(event_id)
            .bind(organization_id)
            .fetch_one(pool)
            .await?;
            if !exists {
                return Err(CampaignError::Validation {
                    field: "event_id",
                    message: "Event not found".to_string(),
                });
            }
        }

        let query = format!(
            r#"
            INSERT INTO email_campaigns (organization_id, event_id, created_by, subject,
                                         body_template, attendees_only)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );

        let campaign = sqlx::query_as::<_, Campaign>(&query)
            .bind(organization_id)
            .bind(input.event_id)
            .bind(created_by)
            .bind(input.subject)
            .bind(input.body_template)
            .bind(input.attendees_only)
            .fetch_one(pool)
            .await?;

        Ok(campaign)
    }

    /// Finds a campaign, restricted to one organization unless None
    pub async fn find(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_campaigns
             WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)",
            CAMPAIGN_COLUMNS
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(pool)
            .await
    }

    /// Lists campaigns, newest first
    pub async fn list(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM email_campaigns
             WHERE ($1::uuid IS NULL OR organization_id = $1)
             ORDER BY created_at DESC
             LIMIT $2",
            CAMPAIGN_COLUMNS
        );
        sqlx::query_as::<_, Campaign>(&query)
            .bind(organization_id)
            .bind(limit.clamp(1, 200))
            .fetch_all(pool)
            .await
    }

    /// Fans a draft campaign out to its recipients and marks it queued
    ///
    /// Recipients are active members of the campaign's organization inside
    /// `scope` (built with alias `u`, placeholders from `$1`), restricted to
    /// attending members of the linked event when `attendees_only` is set.
    pub async fn queue(
        pool: &PgPool,
        organization_id: Option<Uuid>,
        id: Uuid,
        scope: &ScopeFilter,
    ) -> Result<Self, CampaignError> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "SELECT {} FROM email_campaigns
             WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)
             FOR UPDATE",
            CAMPAIGN_COLUMNS
        );
        let campaign = sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .bind(organization_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if campaign.status != CampaignStatus::Draft {
            return Err(CampaignError::NotDraft);
        }

        let p = scope.next_placeholder();
        let mut fan_out = format!(
            r#"
            INSERT INTO email_logs (organization_id, campaign_id, event_id, user_id, kind,
                                    recipient_email, subject, status)
            SELECT u.organization_id, ${campaign}, ${event}, u.id, 'campaign'::email_kind,
                   u.email, ${subject}, 'queued'::email_status
            FROM users u
            WHERE {scope}
              AND u.organization_id = ${org}
              AND u.account_status = 'active'
            "#,
            campaign = p,
            event = p + 1,
            subject = p + 2,
            org = p + 3,
            scope = scope.clause,
        );
        if campaign.attendees_only {
            fan_out.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM event_rsvps r
                              WHERE r.event_id = ${event} AND r.user_id = u.id
                                AND r.status = 'attending')",
                event = p + 1
            ));
        }

        let mut insert = sqlx::query(&fan_out);
        for scope_id in &scope.binds {
            insert = insert.bind(*scope_id);
        }
        let result = insert
            .bind(campaign.id)
            .bind(campaign.event_id)
            .bind(&campaign.subject)
            .bind(campaign.organization_id)
            .execute(&mut *tx)
            .await?;

        let recipients = result.rows_affected();
        if recipients == 0 {
            tx.rollback().await?;
            return Err(CampaignError::NoRecipients);
        }

        let query = format!(
            r#"
            UPDATE email_campaigns
            SET status = 'queued', recipient_count = $2, queued_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );
        let queued = sqlx::query_as::<_, Campaign>(&query)
            .bind(campaign.id)
            .bind(i32::try_from(recipients).unwrap_or(i32::MAX))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(campaign_id = %id, recipients, "Campaign queued");
        Ok(queued)
    }

    /// Moves a queued campaign to `sending`
    pub async fn mark_sending(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE email_campaigns SET status = 'sending', updated_at = NOW()
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Completes a campaign once none of its emails are still queued
    ///
    /// The campaign is `failed` when every email failed, `sent` otherwise.
    /// Returns None while emails remain queued or if already finalized.
    pub async fn finalize(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE email_campaigns c
            SET status = CASE
                    WHEN EXISTS (SELECT 1 FROM email_logs l
                                 WHERE l.campaign_id = c.id AND l.status <> 'failed')
                    THEN 'sent'::campaign_status
                    ELSE 'failed'::campaign_status
                END,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE c.id = $1
              AND c.status IN ('queued', 'sending')
              AND NOT EXISTS (SELECT 1 FROM email_logs l
                              WHERE l.campaign_id = c.id AND l.status = 'queued')
            RETURNING {}
            "#,
            CAMPAIGN_COLUMNS
        );

        sqlx::query_as::<_, Campaign>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Campaigns still being delivered
    pub async fn in_flight(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT id FROM email_campaigns WHERE status IN ('queued', 'sending') ORDER BY queued_at",
        )
        .fetch_all(pool)
        .await
    }

    /// Delivery figures for one campaign
    pub async fn stats(pool: &PgPool, id: Uuid) -> Result<DeliveryStats, sqlx::Error> {
        EmailLog::stats_for_campaign(pool, id).await
    }
}
