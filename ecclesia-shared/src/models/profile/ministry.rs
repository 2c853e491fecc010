/// Ministry/society memberships (choir, Mothers' Union, youth fellowship...)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{optional_text, required_text, ProfileError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MinistryMembership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ministry: String,
    pub role: Option<String>,
    pub joined_on: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinistryInput {
    pub ministry: String,
    pub role: Option<String>,
    pub joined_on: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl MinistryInput {
    pub fn validated(self, row: Option<usize>) -> Result<Self, ProfileError> {
        Ok(Self {
            ministry: required_text(&self.ministry, "ministry", 255, row)?,
            role: optional_text(self.role),
            joined_on: self.joined_on,
            is_active: self.is_active,
        })
    }
}

const COLUMNS: &str = "id, user_id, ministry, role, joined_on, is_active, created_at, updated_at";

impl MinistryMembership {
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM ministry_memberships WHERE user_id = $1
             ORDER BY is_active DESC, ministry",
            COLUMNS
        );
        sqlx::query_as::<_, MinistryMembership>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn add(
        pool: &PgPool,
        user_id: Uuid,
        input: MinistryInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let mut conn = pool.acquire().await?;
        Ok(insert(&mut conn, user_id, input).await?)
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: MinistryInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let query = format!(
            r#"
            UPDATE ministry_memberships
            SET ministry = $3, role = $4, joined_on = $5, is_active = $6, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, MinistryMembership>(&query)
            .bind(id)
            .bind(user_id)
            .bind(input.ministry)
            .bind(input.role)
            .bind(input.joined_on)
            .bind(input.is_active)
            .fetch_optional(pool)
            .await?
            .ok_or(ProfileError::NotFound)
    }

    pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        let result = sqlx::query("DELETE FROM ministry_memberships WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ProfileError::NotFound);
        }
        Ok(())
    }

    /// Replaces the whole section; an empty list clears it
    pub async fn replace_all(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<MinistryInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.validated(Some(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM ministry_memberships WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            saved.push(insert(&mut tx, user_id, row).await?);
        }

        tx.commit().await?;
        Ok(saved)
    }
}

async fn insert(
    conn: &mut PgConnection,
    user_id: Uuid,
    input: MinistryInput,
) -> Result<MinistryMembership, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO ministry_memberships (user_id, ministry, role, joined_on, is_active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        COLUMNS
    );

    sqlx::query_as::<_, MinistryMembership>(&query)
        .bind(user_id)
        .bind(input.ministry)
        .bind(input.role)
        .bind(input.joined_on)
        .bind(input.is_active)
        .fetch_one(conn)
        .await
}
