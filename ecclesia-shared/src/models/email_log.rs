/// Outbound email log
///
/// Every email the system sends (or queues) gets one row. Campaign emails
/// are inserted as `queued` and claimed by the worker, which stamps
/// `claimed_at` and commits before sending; reminders and verification mails are logged
/// directly with their final status. Delivery, open and click updates only
/// ever move a row forward (`queued → sent → delivered → opened → clicked`).
///
/// Subjects are cut to [`SUBJECT_MAX_CHARS`] on insert; rendered subjects
/// (for example "Reminder: " plus a long event title) can outgrow the column.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE email_logs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID REFERENCES organizations(id),
///     campaign_id UUID REFERENCES email_campaigns(id),
///     event_id UUID REFERENCES events(id),
///     user_id UUID REFERENCES users(id),
///     kind email_kind NOT NULL,
///     recipient_email VARCHAR(255) NOT NULL,
///     subject VARCHAR(255) NOT NULL,
///     status email_status NOT NULL DEFAULT 'queued',
///     provider_message_id VARCHAR(255),
///     error TEXT,
///     claimed_at TIMESTAMPTZ,                 -- campaign dispatch lease
///     created_at, sent_at, delivered_at, opened_at, clicked_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "email_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Queued,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "email_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    Verification,
    Campaign,
    Reminder,
    Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailLog {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub kind: EmailKind,
    pub recipient_email: String,
    pub subject: String,
    pub status: EmailStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

const LOG_COLUMNS: &str = "id, organization_id, campaign_id, event_id, user_id, kind, \
     recipient_email, subject, status, provider_message_id, error, created_at, sent_at, \
     delivered_at, opened_at, clicked_at";

/// Width of the `subject` column
pub const SUBJECT_MAX_CHARS: usize = 255;

/// Cuts `subject` to the column width on a character boundary
pub fn clamp_subject(subject: &str) -> &str {
    match subject.char_indices().nth(SUBJECT_MAX_CHARS) {
        Some((end, _)) => &subject[..end],
        None => subject,
    }
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub organization_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub kind: EmailKind,
    pub recipient_email: String,
    pub subject: String,
    pub status: EmailStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// A claimed campaign email with everything needed to render it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueuedEmail {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub recipient_email: String,
    pub subject: String,
    pub body_template: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization_name: Option<String>,
    pub event_title: Option<String>,
    pub event_starts_at: Option<DateTime<Utc>>,
    pub event_location: Option<String>,
}

/// Delivery notification reported by the email provider's webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Failed,
}

impl ProviderEvent {
    /// Maps a provider event name; unknown names are ignored
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "delivered" => Some(ProviderEvent::Delivered),
            "opened" | "unique_opened" | "open" => Some(ProviderEvent::Opened),
            "click" | "clicked" => Some(ProviderEvent::Clicked),
            "hard_bounce" | "soft_bounce" | "bounce" | "bounced" | "blocked" | "invalid_email" => {
                Some(ProviderEvent::Bounced)
            }
            "error" | "failed" => Some(ProviderEvent::Failed),
            _ => None,
        }
    }
}

/// Aggregate delivery figures for a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryStats {
    pub total: i64,
    pub queued: i64,
    pub sent: i64,
    pub delivered: i64,
    pub opened: i64,
    pub clicked: i64,
    pub bounced: i64,
    pub failed: i64,
}

impl EmailLog {
    pub async fn insert<'e, E>(executor: E, data: NewEmailLog) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let sent_at = match data.status {
            EmailStatus::Queued | EmailStatus::Failed => None,
            _ => Some(Utc::now()),
        };
        let query = format!(
            r#"
            INSERT INTO email_logs (organization_id, campaign_id, event_id, user_id, kind,
                                    recipient_email, subject, status, provider_message_id,
                                    error, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            LOG_COLUMNS
        );

        sqlx::query_as::<_, EmailLog>(&query)
            .bind(data.organization_id)
            .bind(data.campaign_id)
            .bind(data.event_id)
            .bind(data.user_id)
            .bind(data.kind)
            .bind(data.recipient_email)
            .bind(clamp_subject(&data.subject))
            .bind(data.status)
            .bind(data.provider_message_id)
            .bind(data.error)
            .bind(sent_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM email_logs WHERE id = $1", LOG_COLUMNS);
        sqlx::query_as::<_, EmailLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Claims up to `batch` queued campaign emails for this worker
    ///
    /// The claim is stamped and committed before anything is sent, so each
    /// outcome can be recorded on its own afterwards. Other workers skip
    /// claimed rows until `lease` has passed; a claim older than that is
    /// treated as abandoned by a crashed worker and taken again.
    pub async fn claim_queued(
        pool: &PgPool,
        batch: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedEmail>, sqlx::Error> {
        sqlx::query_as::<_, QueuedEmail>(
            r#"
            WITH claimed AS (
                UPDATE email_logs
                SET claimed_at = NOW()
                WHERE id IN (
                    SELECT id FROM email_logs
                    WHERE status = 'queued'
                      AND campaign_id IS NOT NULL
                      AND (claimed_at IS NULL OR claimed_at < $2)
                    ORDER BY created_at
                    LIMIT $1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, campaign_id, user_id, recipient_email, subject, created_at
            )
            SELECT l.id, c.id AS campaign_id, l.recipient_email, l.subject, c.body_template,
                   u.first_name, u.last_name, o.name AS organization_name,
                   e.title AS event_title, e.starts_at AS event_starts_at,
                   e.location AS event_location
            FROM claimed l
            JOIN email_campaigns c ON c.id = l.campaign_id
            LEFT JOIN users u ON u.id = l.user_id
            LEFT JOIN organizations o ON o.id = c.organization_id
            LEFT JOIN events e ON e.id = c.event_id
            ORDER BY l.created_at
            "#,
        )
        .bind(batch)
        .bind(Utc::now() - lease)
        .fetch_all(pool)
        .await
    }

    pub async fn mark_sent<'e, E>(
        executor: E,
        id: Uuid,
        provider_message_id: Option<&str>,
    ) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            UPDATE email_logs
            SET status = 'sent', provider_message_id = $2, sent_at = NOW(), error = NULL
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn mark_failed<'e, E>(executor: E, id: Uuid, error: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE email_logs SET status = 'failed', error = $2 WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .bind(error)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Records an open from the tracking pixel; returns whether the row exists
    pub async fn mark_opened(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_logs
            SET opened_at = COALESCE(opened_at, NOW()),
                status = CASE WHEN status IN ('sent', 'delivered')
                              THEN 'opened'::email_status ELSE status END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records a click from the redirect link; a click implies an open
    pub async fn mark_clicked(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE email_logs
            SET clicked_at = COALESCE(clicked_at, NOW()),
                opened_at = COALESCE(opened_at, NOW()),
                status = CASE WHEN status IN ('sent', 'delivered', 'opened')
                              THEN 'clicked'::email_status ELSE status END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Applies a provider webhook event by provider message id
    ///
    /// Returns the number of rows updated (0 for unknown message ids).
    pub async fn apply_provider_event(
        pool: &PgPool,
        provider_message_id: &str,
        event: ProviderEvent,
        reason: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let sql = match event {
            ProviderEvent::Delivered => {
                r#"
                UPDATE email_logs
                SET delivered_at = COALESCE(delivered_at, NOW()),
                    status = CASE WHEN status = 'sent' THEN 'delivered'::email_status ELSE status END
                WHERE provider_message_id = $1
                "#
            }
            ProviderEvent::Opened => {
                r#"
                UPDATE email_logs
                SET opened_at = COALESCE(opened_at, NOW()),
                    status = CASE WHEN status IN ('sent', 'delivered')
                                  THEN 'opened'::email_status ELSE status END
                WHERE provider_message_id = $1
                "#
            }
            ProviderEvent::Clicked => {
                r#"
                UPDATE email_logs
                SET clicked_at = COALESCE(clicked_at, NOW()),
                    opened_at = COALESCE(opened_at, NOW()),
                    status = CASE WHEN status IN ('sent', 'delivered', 'opened')
                                  THEN 'clicked'::email_status ELSE status END
                WHERE provider_message_id = $1
                "#
            }
            ProviderEvent::Bounced => {
                r#"
                UPDATE email_logs
                SET status = 'bounced', error = COALESCE($2, error)
                WHERE provider_message_id = $1 AND status IN ('sent', 'delivered')
                "#
            }
            ProviderEvent::Failed => {
                r#"
                UPDATE email_logs
                SET status = 'failed', error = COALESCE($2, error)
                WHERE provider_message_id = $1 AND status IN ('queued', 'sent')
                "#
            }
        };

        let mut query = sqlx::query(sql).bind(provider_message_id);
        if matches!(event, ProviderEvent::Bounced | ProviderEvent::Failed) {
            query = query.bind(reason);
        }

        let result = query.execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Delivery figures for one campaign
    pub async fn stats_for_campaign(
        pool: &PgPool,
        campaign_id: Uuid,
    ) -> Result<DeliveryStats, sqlx::Error> {
        sqlx::query_as::<_, DeliveryStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE sent_at IS NOT NULL) AS sent,
                COUNT(*) FILTER (WHERE delivered_at IS NOT NULL) AS delivered,
                COUNT(*) FILTER (WHERE opened_at IS NOT NULL) AS opened,
                COUNT(*) FILTER (WHERE clicked_at IS NOT NULL) AS clicked,
                COUNT(*) FILTER (WHERE status = 'bounced') AS bounced,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM email_logs
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_event_names() {
        assert_eq!(ProviderEvent::parse("delivered"), Some(ProviderEvent::Delivered));
        assert_eq!(ProviderEvent::parse("unique_opened"), Some(ProviderEvent::Opened));
        assert_eq!(ProviderEvent::parse("click"), Some(ProviderEvent::Clicked));
        assert_eq!(ProviderEvent::parse("HARD_BOUNCE"), Some(ProviderEvent::Bounced));
        assert_eq!(ProviderEvent::parse("error"), Some(ProviderEvent::Failed));
        assert_eq!(ProviderEvent::parse("spam"), None);
    }

    #[test]
    fn test_clamp_subject_counts_characters() {
        assert_eq!(clamp_subject("Harvest"), "Harvest");

        let long = "é".repeat(300);
        let clamped = clamp_subject(&long);
        assert_eq!(clamped.chars().count(), SUBJECT_MAX_CHARS);
        assert!(long.starts_with(clamped));

        let exact = "a".repeat(SUBJECT_MAX_CHARS);
        assert_eq!(clamp_subject(&exact), exact);
    }
}
