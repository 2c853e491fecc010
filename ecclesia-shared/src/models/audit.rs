/// Role change audit trail
///
/// One row per role change. Inserts happen on the caller's connection so the
/// entry shares the role update's transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::user::RoleLevel;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleAudit {
    pub id: Uuid,

    /// Administrator who made the change (None once their account is gone)
    pub actor_id: Option<Uuid>,

    pub target_user_id: Uuid,
    pub old_role: RoleLevel,
    pub new_role: RoleLevel,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RoleAudit {
    /// Inserts an audit row on the given connection
    pub async fn record(
        conn: &mut PgConnection,
        actor_id: Uuid,
        target_user_id: Uuid,
        old_role: RoleLevel,
        new_role: RoleLevel,
        reason: Option<String>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, RoleAudit>(
            r#"
            INSERT INTO role_audit_log (actor_id, target_user_id, old_role, new_role, reason)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, actor_id, target_user_id, old_role, new_role, reason, created_at
            "#,
        )
        .bind(actor_id)
        .bind(target_user_id)
        .bind(old_role)
        .bind(new_role)
        .bind(reason)
        .fetch_one(conn)
        .await
    }

    /// Role history of one user, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        target_user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, RoleAudit>(
            r#"
            SELECT id, actor_id, target_user_id, old_role, new_role, reason, created_at
            FROM role_audit_log
            WHERE target_user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(target_user_id)
        .fetch_all(pool)
        .await
    }
}
