/// Employment history section
///
/// # Schema
///
/// ```sql
/// CREATE TABLE employment_records (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     employer VARCHAR(255) NOT NULL,
///     position VARCHAR(255) NOT NULL,
///     start_date DATE,
///     end_date DATE,
///     is_current BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CHECK (NOT is_current OR end_date IS NULL)
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{period_end, required_text, ProfileError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub employer: String,
    pub position: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the employment form
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmploymentInput {
    pub employer: String,
    pub position: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_current: bool,
}

impl EmploymentInput {
    /// Trims fields and resolves the end date
    pub fn validated(self, row: Option<usize>) -> Result<Self, ProfileError> {
        Ok(Self {
            employer: required_text(&self.employer, "employer", 255, row)?,
            position: required_text(&self.position, "position", 255, row)?,
            end_date: period_end(self.start_date, self.end_date, self.is_current, row)?,
            start_date: self.start_date,
            is_current: self.is_current,
        })
    }
}

const COLUMNS: &str =
    "id, user_id, employer, position, start_date, end_date, is_current, created_at, updated_at";

impl Employment {
    /// Lists a user's employment history, current and most recent first
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM employment_records WHERE user_id = $1
             ORDER BY is_current DESC, start_date DESC NULLS LAST, created_at",
            COLUMNS
        );
        sqlx::query_as::<_, Employment>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Adds one employment row
    pub async fn add(
        pool: &PgPool,
        user_id: Uuid,
        input: EmploymentInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let mut conn = pool.acquire().await?;
        Ok(insert(&mut conn, user_id, input).await?)
    }

    /// Updates one of the user's rows
    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: EmploymentInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let query = format!(
            r#"
            UPDATE employment_records
            SET employer = $3, position = $4, start_date = $5, end_date = $6,
                is_current = $7, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, Employment>(&query)
            .bind(id)
            .bind(user_id)
            .bind(input.employer)
            .bind(input.position)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(input.is_current)
            .fetch_optional(pool)
            .await?
            .ok_or(ProfileError::NotFound)
    }

    /// Deletes one of the user's rows
    ///
    /// The section may not become empty, so removing the last row gives
    /// [`ProfileError::EmptySection`].
    pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        let mut tx = pool.begin().await?;

        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM employment_records WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;
        if !ids.contains(&id) {
            return Err(ProfileError::NotFound);
        }
        if ids.len() == 1 {
            return Err(ProfileError::EmptySection("employment"));
        }

        sqlx::query("DELETE FROM employment_records WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the whole section with the submitted rows
    ///
    /// # Errors
    ///
    /// [`ProfileError::EmptySection`] when no rows are submitted; the
    /// existing rows are left untouched.
    pub async fn replace_all(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<EmploymentInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        if rows.is_empty() {
            return Err(ProfileError::EmptySection("employment"));
        }
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.validated(Some(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM employment_records WHERE user_id = $1")
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
    input: EmploymentInput,
) -> Result<Employment, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO employment_records (user_id, employer, position, start_date, end_date, is_current)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        COLUMNS
    );

    sqlx::query_as::<_, Employment>(&query)
        .bind(user_id)
        .bind(input.employer)
        .bind(input.position)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.is_current)
        .fetch_one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_job_has_no_end_date() {
        let input = EmploymentInput {
            employer: " Shell Nigeria ".to_string(),
            position: "Engineer".to_string(),
            start_date: NaiveDate::from_ymd_opt(2019, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2023, 3, 1),
            is_current: true,
        }
        .validated(None)
        .unwrap();

        assert_eq!(input.employer, "Shell Nigeria");
        assert_eq!(input.end_date, None);
    }

    #[test]
    fn test_missing_position_rejected() {
        let result = EmploymentInput {
            employer: "Shell".to_string(),
            ..Default::default()
        }
        .validated(Some(3));

        assert!(matches!(
            result,
            Err(ProfileError::Validation { field: "position", row: Some(3), .. })
        ));
    }
}
