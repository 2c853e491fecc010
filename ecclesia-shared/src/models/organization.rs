/// Organization (tenant) model and database operations
///
/// Every church instance is an organization. Users, events and campaigns
/// all hang off one, and every scoped query filters on `organization_id`
/// unless the caller is a super admin.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE organizations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     slug VARCHAR(100) NOT NULL UNIQUE,
///     contact_email VARCHAR(255),
///     subscription_status subscription_status NOT NULL DEFAULT 'trial',
///     max_users INTEGER NOT NULL DEFAULT 0,   -- 0 = unlimited
///     province_id UUID REFERENCES provinces(id),
///     diocese_id UUID REFERENCES dioceses(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::models::organization::{Organization, CreateOrganization};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let church = Organization::create(&pool, CreateOrganization {
///     name: "St. Peter's Cathedral".to_string(),
///     slug: None,
///     contact_email: Some("office@stpeters.org".to_string()),
///     max_users: 500,
///     province_id: None,
///     diocese_id: None,
/// }).await?;
///
/// assert_eq!(church.slug, "st-peter-s-cathedral");
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Billing state of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether new members may join under this status
    pub fn allows_registration(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }
}

/// Organization model representing one church tenant
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// URL-safe unique identifier used at registration
    pub slug: String,

    pub contact_email: Option<String>,

    pub subscription_status: SubscriptionStatus,

    /// Member cap; 0 means unlimited
    pub max_users: i32,

    pub province_id: Option<Uuid>,
    pub diocese_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ORGANIZATION_COLUMNS: &str = "id, name, slug, contact_email, subscription_status, max_users, \
     province_id, diocese_id, created_at, updated_at";

/// Input for provisioning a new organization
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrganization {
    #[validate(length(min = 1, max = 255, message = "Church name is required"))]
    pub name: String,

    /// Derived from the name when absent
    pub slug: Option<String>,

    #[validate(email(message = "Invalid email address"))]
    pub contact_email: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, message = "Member limit cannot be negative"))]
    pub max_users: i32,

    pub province_id: Option<Uuid>,
    pub diocese_id: Option<Uuid>,
}

/// Input for updating an organization; None fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateOrganization {
    #[validate(length(min = 1, max = 255, message = "Church name cannot be blank"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub contact_email: Option<String>,
    #[validate(range(min = 0, message = "Member limit cannot be negative"))]
    pub max_users: Option<i32>,
}

fn trimmed_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

impl CreateOrganization {
    /// Trims the name and drops a blank contact email
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            contact_email: trimmed_email(self.contact_email),
            ..self
        }
    }
}

impl UpdateOrganization {
    /// Trims the name; a blank contact email leaves the stored one unchanged
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.map(|n| n.trim().to_string()),
            contact_email: trimmed_email(self.contact_email),
            ..self
        }
    }
}

/// Organization with its current member count, for the super admin list
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrganizationSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub organization: Organization,
    pub user_count: i64,
}

/// Builds a URL slug from a display name
///
/// Lower-cases ASCII alphanumerics and collapses every other run of
/// characters into a single hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

impl Organization {
    /// Whether the tenant can accept another member given its current count
    ///
    /// Requires a trial or active subscription, and a count below
    /// `max_users` unless the cap is 0.
    pub fn has_capacity(&self, current_users: i64) -> bool {
        if !self.subscription_status.allows_registration() {
            return false;
        }
        self.max_users == 0 || current_users < i64::from(self.max_users)
    }

    /// Creates a new organization in trial status
    ///
    /// # Errors
    ///
    /// Returns a unique-violation database error when the slug is taken.
    pub async fn create(pool: &PgPool, data: CreateOrganization) -> Result<Self, sqlx::Error> {
        let slug = data
            .slug
            .as_deref()
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(&data.name));

        let query = format!(
            r#"
            INSERT INTO organizations (name, slug, contact_email, max_users, province_id, diocese_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ORGANIZATION_COLUMNS
        );

        sqlx::query_as::<_, Organization>(&query)
            .bind(data.name.trim())
            .bind(slug)
            .bind(data.contact_email)
            .bind(data.max_users.max(0))
            .bind(data.province_id)
            .bind(data.diocese_id)
            .fetch_one(pool)
            .await
    }

    /// Finds an organization by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM organizations WHERE id = $1",
            ORGANIZATION_COLUMNS
        );
        sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds an organization by slug
    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM organizations WHERE slug = $1",
            ORGANIZATION_COLUMNS
        );
        sqlx::query_as::<_, Organization>(&query)
            .bind(slug.trim().to_lowercase())
            .fetch_optional(pool)
            .await
    }

    /// Lists every organization with its member count, by name
    pub async fn list(pool: &PgPool) -> Result<Vec<OrganizationSummary>, sqlx::Error> {
        sqlx::query_as::<_, OrganizationSummary>(
            r#"
            SELECT o.id, o.name, o.slug, o.contact_email, o.subscription_status, o.max_users,
                   o.province_id, o.diocese_id, o.created_at, o.updated_at,
                   COUNT(u.id) AS user_count
            FROM organizations o
            LEFT JOIN users u ON u.organization_id = o.id
            GROUP BY o.id
            ORDER BY o.name
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Updates an existing organization
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateOrganization,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE organizations SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.contact_email.is_some() {
            bind_count += 1;
            query.push_str(&format!(", contact_email = ${}", bind_count));
        }
        if data.max_users.is_some() {
            bind_count += 1;
            query.push_str(&format!(", max_users = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {}", ORGANIZATION_COLUMNS));

        let mut q = sqlx::query_as::<_, Organization>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(email) = data.contact_email {
            q = q.bind(email);
        }
        if let Some(max_users) = data.max_users {
            q = q.bind(max_users.max(0));
        }

        q.fetch_optional(pool).await
    }

    /// Sets the subscription status and optionally the member cap
    pub async fn update_subscription(
        pool: &PgPool,
        id: Uuid,
        status: SubscriptionStatus,
        max_users: Option<i32>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE organizations
            SET subscription_status = $2,
                max_users = COALESCE($3, max_users),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORGANIZATION_COLUMNS
        );

        let org = sqlx::query_as::<_, Organization>(&query)
            .bind(id)
            .bind(status)
            .bind(max_users.map(|m| m.max(0)))
            .fetch_optional(pool)
            .await?;

        if org.is_some() {
            tracing::info!(
                organization_id = %id,
                status = status.as_str(),
                "Subscription updated"
            );
        }

        Ok(org)
    }

    /// Counts members that occupy a seat (everything except inactive)
    pub async fn count_users(pool: &PgPool, id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE organization_id = $1 AND account_status <> 'inactive'",
        )
        .bind(id)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(status: SubscriptionStatus, max_users: i32) -> Organization {
        Organization {
            id: Uuid::new_v4(),
            name: "St. Paul's".to_string(),
            slug: "st-paul-s".to_string(),
            contact_email: None,
            subscription_status: status,
            max_users,
            province_id: None,
            diocese_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("St. Peter's Cathedral"), "st-peter-s-cathedral");
        assert_eq!(slugify("  All Saints  "), "all-saints");
        assert_eq!(slugify("Emmanuel--Church, Ikoyi"), "emmanuel-church-ikoyi");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_capacity_zero_is_unlimited() {
        let o = org(SubscriptionStatus::Active, 0);
        assert!(o.has_capacity(1_000_000));
    }

    #[test]
    fn test_capacity_respects_limit() {
        let o = org(SubscriptionStatus::Trial, 10);
        assert!(o.has_capacity(9));
        assert!(!o.has_capacity(10));
    }

    #[test]
    fn test_capacity_requires_live_subscription() {
        assert!(!org(SubscriptionStatus::Cancelled, 0).has_capacity(0));
        assert!(!org(SubscriptionStatus::PastDue, 100).has_capacity(1));
    }

    #[test]
    fn test_subscription_serde() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
