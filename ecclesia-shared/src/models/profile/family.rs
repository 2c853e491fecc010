/// Family members section

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{optional_text, required_text, ProfileError};

/// Accepted relationship values
pub const RELATIONSHIPS: [&str; 5] = ["spouse", "child", "parent", "sibling", "other"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FamilyMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub relationship: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    /// Whether the relative is also a member of the church
    pub is_member: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyMemberInput {
    pub full_name: String,
    pub relationship: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_member: bool,
}

impl FamilyMemberInput {
    pub fn validated(self, row: Option<usize>) -> Result<Self, ProfileError> {
        let relationship = self.relationship.trim().to_lowercase();
        if !RELATIONSHIPS.contains(&relationship.as_str()) {
            return Err(ProfileError::invalid(
                "relationship",
                row,
                format!("Unknown relationship: {}", self.relationship.trim()),
            ));
        }

        Ok(Self {
            full_name: required_text(&self.full_name, "full_name", 255, row)?,
            relationship,
            date_of_birth: self.date_of_birth,
            phone: optional_text(self.phone),
            is_member: self.is_member,
        })
    }
}

const COLUMNS: &str =
    "id, user_id, full_name, relationship, date_of_birth, phone, is_member, created_at, updated_at";

impl FamilyMember {
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM family_members WHERE user_id = $1 ORDER BY created_at",
            COLUMNS
        );
        sqlx::query_as::<_, FamilyMember>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn add(
        pool: &PgPool,
        user_id: Uuid,
        input: FamilyMemberInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let mut conn = pool.acquire().await?;
        Ok(insert(&mut conn, user_id, input).await?)
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: FamilyMemberInput,
    ) -> Result<Self, ProfileError> {
        let input = input.validated(None)?;
        let query = format!(
            r#"
            UPDATE family_members
            SET full_name = $3, relationship = $4, date_of_birth = $5, phone = $6,
                is_member = $7, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );

        sqlx::query_as::<_, FamilyMember>(&query)
            .bind(id)
            .bind(user_id)
            .bind(input.full_name)
            .bind(input.relationship)
            .bind(input.date_of_birth)
            .bind(input.phone)
            .bind(input.is_member)
            .fetch_optional(pool)
            .await?
            .ok_or(ProfileError::NotFound)
    }

    pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        let result = sqlx::query("DELETE FROM family_members WHERE id = $1 AND user_id = $2")
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
        rows: Vec<FamilyMemberInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.validated(Some(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM family_members WHERE user_id = $1")
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
    input: FamilyMemberInput,
) -> Result<FamilyMember, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO family_members (user_id, full_name, relationship, date_of_birth, phone, is_member)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        COLUMNS
    );

    sqlx::query_as::<_, FamilyMember>(&query)
        .bind(user_id)
        .bind(input.full_name)
        .bind(input.relationship)
        .bind(input.date_of_birth)
        .bind(input.phone)
        .bind(input.is_member)
        .fetch_one(conn)
        .await
}
