/// Church leadership roles section
///
/// # Schema
///
/// ```sql
/// CREATE TABLE leadership_roles (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(255) NOT NULL,
///     church_level VARCHAR(32) NOT NULL DEFAULT 'parish',
///     start_date DATE,
///     end_date DATE,
///     is_current BOOLEAN NOT NULL DEFAULT FALSE,
///     CHECK (NOT is_current OR end_date IS NULL)
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{period_end, required_text, ProfileError};

/// Levels at which a leadership role can be held
pub const CHURCH_LEVELS: [&str; 6] = [
    "parish",
    "deanery",
    "archdeaconry",
    "diocese",
    "province",
    "national",
];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeadershipRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub church_level: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadershipInput {
    pub title: String,
    /// Defaults to `parish`
    pub church_level: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_current: bool,
}

impl LeadershipInput {
    pub fn validated(self, row: Option<usize>) -> Result<Self, ProfileError> {
        let level = self
            .church_level
            .as_deref()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "parish".to_string());

        if !CHURCH_LEVELS.contains(&level.as_str()) {
            return Err(ProfileError::invalid(
                "church_level",
                row,
                format!("Unknown church level: {}", level),
            ));
        }

        Ok(Self {
            title: required_text(&self.title, "title", 255, row)?,
            church_level: Some(level),
            end_date: period_end(self.start_date, self.end_date, self.is_current, row)?,
            start_date: self.start_date,
            is_current: self.is_current,
        })
    }
}

const COLUMNS: &str =
    "id, user_id, title, church_level, start_date, end_date, is_current, created_at, updated_at";

impl LeadershipRole {
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM leadership_roles WHERE user_id = $1
             ORDER BY is_current DESC, start_date DESC NULLS LAST, created_at",
            COLUMNS
        );
        sqlx::query_as::<_, LeadershipRole>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn add(
        pool: &PgPool,
        user_id: Uuid,
        input: LeadershipInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let mut conn = pool.acquire().await?;
        Ok(insert(&mut conn, user_id, input).await?)
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: LeadershipInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let query = format!(
            r#"
            UPDATE leadership_roles
            SET title = $3, church_level = $4, start_date = $5, end_date = $6,
                is_current = $7, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, LeadershipRole>(&query)
            .bind(id)
            .bind(user_id)
            .bind(input.title)
            .bind(input.church_level)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.is_current)
            .fetch_optional(pool)
            .await?
            .ok_or(ProfileError::NotFound)
    }

    /// Deletes one row; the last one stays
    pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        let mut tx = pool.begin().await?;

        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM leadership_roles WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;
        if !ids.contains(&id) {
            return Err(ProfileError::NotFound);
        }
        if ids.len() == 1 {
            return Err(ProfileError::EmptySection("leadership"));
        }

        sqlx::query("DELETE FROM leadership_roles WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the whole section; an empty submission is rejected
    pub async fn replace_all(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<LeadershipInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        if rows.is_empty() {
            return Err(ProfileError::EmptySection("leadership"));
        }
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.validated(Some(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM leadership_roles WHERE user_id = $1")
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
    input: LeadershipInput,
) -> Result<LeadershipRole, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO leadership_roles (user_id, title, church_level, start_date, end_date, is_current)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        COLUMNS
    );

    sqlx::query_as::<_, LeadershipRole>(&query)
        .bind(user_id)
        .bind(input.title)
        .bind(input.church_level.unwrap_or_else(|| "parish".to_string()))
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.is_current)
        .fetch_one(conn)
        .await
}
