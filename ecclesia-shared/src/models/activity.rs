/// Activity log
///
/// Records notable user actions (logins, profile saves, RSVPs) for the
/// dashboards. Writing an entry is a side effect and must never fail the
/// request that triggered it, so [`Activity::record`] swallows errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,

    /// Short machine name, e.g. `login` or `profile.personal.updated`
    pub action: String,

    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    /// Records an activity entry, logging instead of returning failures
    pub async fn record(
        pool: &PgPool,
        user_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        action: &str,
        details: JsonValue,
    ) {
        let result = sqlx::query(
            "INSERT INTO activity_log (user_id, organization_id, action, details)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(action)
        .bind(details)
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, action, "Failed to record activity");
        }
    }

    /// Most recent entries for one user
    pub async fn recent_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT id, user_id, organization_id, action, details, created_at
            FROM activity_log
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Most recent entries across an organization
    pub async fn recent_for_organization(
        pool: &PgPool,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Activity>(
            r#"
            SELECT id, user_id, organization_id, action, details, created_at
            FROM activity_log
            WHERE organization_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
