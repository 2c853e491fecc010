/// User model and database operations
///
/// Users belong to exactly one organization (tenant) and carry the hierarchy
/// ids that the scope resolver turns into row filters. Accounts are never
/// hard-deleted; they move between [`AccountStatus`] values instead.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     organization_id UUID NOT NULL REFERENCES organizations(id),
///     email VARCHAR(255) NOT NULL,            -- unique on LOWER(email)
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100) NOT NULL,
///     ...personal fields...,
///     role_level role_level NOT NULL DEFAULT 'member',
///     province_id .. parish_id UUID,
///     account_status account_status NOT NULL DEFAULT 'pending',
///     theme VARCHAR(16) NOT NULL DEFAULT 'light',
///     email_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     verification_token_hash VARCHAR(64),
///     created_at, updated_at TIMESTAMPTZ NOT NULL,
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::models::user::{User, CreateUser, RoleLevel, AccountStatus};
/// use ecclesia_shared::models::hierarchy::HierarchyIds;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, organization_id: Uuid) -> Result<(), sqlx::Error> {
/// let mut conn = pool.acquire().await?;
/// let user = User::create(&mut conn, CreateUser {
///     organization_id,
///     email: "ada@example.org".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     first_name: "Ada".to_string(),
///     last_name: "Obi".to_string(),
///     other_names: None,
///     phone: None,
///     gender: None,
///     role_level: RoleLevel::Member,
///     account_status: AccountStatus::Pending,
///     hierarchy: HierarchyIds::default(),
///     verification_token_hash: None,
/// }).await?;
///
/// let found = User::find_by_email(&pool, "ADA@example.org").await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::audit::RoleAudit;
use super::hierarchy::HierarchyIds;
use crate::{auth::scope::ScopeFilter, validation::cross_field_error};

/// Administrative tier of an account
///
/// Drives both UI visibility and the SQL filter scope. Ordered from the
/// widest jurisdiction (super_admin) down to member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "role_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoleLevel {
    /// Platform operator: every tenant, provisioning
    SuperAdmin,
    /// Province-wide administrator
    NationalAdmin,
    DioceseAdmin,
    ArchdeaconryAdmin,
    DeaneryAdmin,
    ParishAdmin,
    /// Regular member: own profile only
    Member,
}

impl RoleLevel {
    /// Every role, widest first
    pub const ALL: [RoleLevel; 7] = [
        RoleLevel::SuperAdmin,
        RoleLevel::NationalAdmin,
        RoleLevel::DioceseAdmin,
        RoleLevel::ArchdeaconryAdmin,
        RoleLevel::DeaneryAdmin,
        RoleLevel::ParishAdmin,
        RoleLevel::Member,
    ];

    /// Converts role to string for display and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleLevel::SuperAdmin => "super_admin",
            RoleLevel::NationalAdmin => "national_admin",
            RoleLevel::DioceseAdmin => "diocese_admin",
            RoleLevel::ArchdeaconryAdmin => "archdeaconry_admin",
            RoleLevel::DeaneryAdmin => "deanery_admin",
            RoleLevel::ParishAdmin => "parish_admin",
            RoleLevel::Member => "member",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            RoleLevel::SuperAdmin => "Super Administrator",
            RoleLevel::NationalAdmin => "National Administrator",
            RoleLevel::DioceseAdmin => "Diocese Administrator",
            RoleLevel::ArchdeaconryAdmin => "Archdeaconry Administrator",
            RoleLevel::DeaneryAdmin => "Deanery Administrator",
            RoleLevel::ParishAdmin => "Parish Administrator",
            RoleLevel::Member => "Member",
        }
    }

    /// Numeric rank; higher means wider jurisdiction
    pub fn rank(&self) -> u8 {
        match self {
            RoleLevel::SuperAdmin => 7,
            RoleLevel::NationalAdmin => 6,
            RoleLevel::DioceseAdmin => 5,
            RoleLevel::ArchdeaconryAdmin => 4,
            RoleLevel::DeaneryAdmin => 3,
            RoleLevel::ParishAdmin => 2,
            RoleLevel::Member => 1,
        }
    }

    /// Whether this role is at least as wide as `required`
    pub fn has_permission(&self, required: &RoleLevel) -> bool {
        self.rank() >= required.rank()
    }

    /// Any administrative role
    pub fn is_admin(&self) -> bool {
        !matches!(self, RoleLevel::Member)
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, RoleLevel::SuperAdmin)
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleLevel::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown role level: {}", s))
    }
}

/// Lifecycle state of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Registered, awaiting email verification or approval
    Pending,
    Active,
    /// Blocked by an administrator
    Suspended,
    /// Left the church or deactivated; kept for records
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Inactive => "inactive",
        }
    }

    /// Whether an account in this state may sign in
    pub fn can_login(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }

    /// Message shown when a sign-in is refused for this state
    pub fn login_refusal(&self) -> Option<&'static str> {
        match self {
            AccountStatus::Active => None,
            AccountStatus::Pending => {
                Some("Your account is pending. Please verify your email address or wait for approval.")
            }
            AccountStatus::Suspended => {
                Some("Your account has been suspended. Please contact your church administrator.")
            }
            AccountStatus::Inactive => Some("Your account is inactive."),
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AccountStatus::Pending),
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "inactive" => Ok(AccountStatus::Inactive),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

/// Colour theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }
}

/// User model representing a church member account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,

    /// Stored lower-cased
    pub email: String,

    /// Argon2id password hash; never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub other_names: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marital_status: Option<String>,
    pub address: Option<String>,
    pub baptized: bool,
    pub baptism_date: Option<NaiveDate>,
    pub confirmed: bool,
    pub confirmation_date: Option<NaiveDate>,

    pub role_level: RoleLevel,
    pub province_id: Option<Uuid>,
    pub diocese_id: Option<Uuid>,
    pub archdeaconry_id: Option<Uuid>,
    pub deanery_id: Option<Uuid>,
    pub parish_id: Option<Uuid>,

    pub account_status: AccountStatus,
    pub theme: String,
    pub email_verified: bool,

    #[serde(skip_serializing)]
    pub verification_token_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Hierarchy ids as a single value
    pub fn hierarchy(&self) -> HierarchyIds {
        HierarchyIds {
            province_id: self.province_id,
            diocese_id: self.diocese_id,
            archdeaconry_id: self.archdeaconry_id,
            deanery_id: self.deanery_id,
            parish_id: self.parish_id,
        }
    }

    pub fn full_name(&self) -> String {
        match self.other_names.as_deref().filter(|n| !n.is_empty()) {
            Some(other) => format!("{} {} {}", self.first_name, other, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

const USER_COLUMNS: &str = "id, organization_id, email, password_hash, first_name, last_name, \
     other_names, phone, gender, date_of_birth, marital_status, address, baptized, baptism_date, \
     confirmed, confirmation_date, role_level, province_id, diocese_id, archdeaconry_id, \
     deanery_id, parish_id, account_status, theme, email_verified, verification_token_hash, \
     created_at, updated_at, last_login_at";

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub organization_id: Uuid,
    pub email: String,
    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub other_names: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub role_level: RoleLevel,
    pub account_status: AccountStatus,
    pub hierarchy: HierarchyIds,
    /// SHA-256 of the emailed verification token
    pub verification_token_hash: Option<String>,
}

/// Personal section of the profile form
///
/// The whole section is replaced on save. Sacrament dates are dropped when
/// the matching flag is off.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "born_in_the_past"))]
pub struct UpdatePersonal {
    #[validate(length(min = 1, max = 100, message = "First name is required (max 100 characters)"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required (max 100 characters)"))]
    pub last_name: String,
    pub other_names: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub marital_status: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub baptized: bool,
    pub baptism_date: Option<NaiveDate>,
    #[serde(default)]
    pub confirmed: bool,
    pub confirmation_date: Option<NaiveDate>,
}

fn born_in_the_past(data: &UpdatePersonal) -> Result<(), ValidationError> {
    match data.date_of_birth {
        Some(dob) if dob > Utc::now().date_naive() => Err(cross_field_error(
            "date_of_birth",
            "Date of birth cannot be in the future",
        )),
        _ => Ok(()),
    }
}

impl UpdatePersonal {
    /// Trims names and clears sacrament dates whose flag is off
    pub fn normalized(mut self) -> Self {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        if !self.baptized {
            self.baptism_date = None;
        }
        if !self.confirmed {
            self.confirmation_date = None;
        }
        self
    }
}

/// Filters for the member directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberQuery {
    pub status: Option<AccountStatus>,
    pub role: Option<RoleLevel>,
    /// Matches first name, last name or email (case-insensitive)
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl MemberQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    fn search_pattern(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }

    /// Appends the non-scope filters to `sql`, numbering placeholders from `next`
    fn push_filters(&self, sql: &mut String, mut next: usize) -> usize {
        if self.status.is_some() {
            sql.push_str(&format!(" AND u.account_status = ${}", next));
            next += 1;
        }
        if self.role.is_some() {
            sql.push_str(&format!(" AND u.role_level = ${}", next));
            next += 1;
        }
        if self.search_pattern().is_some() {
            sql.push_str(&format!(
                " AND (u.first_name ILIKE ${n} OR u.last_name ILIKE ${n} OR u.email ILIKE ${n})",
                n = next
            ));
            next += 1;
        }
        next
    }
}

/// Normalises an email address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    /// Creates a new user
    ///
    /// Takes a connection so registration can run inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns a database error with constraint `idx_users_email` when the
    /// email is already registered.
    pub async fn create(conn: &mut PgConnection, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (
                organization_id, email, password_hash, first_name, last_name, other_names,
                phone, gender, role_level, account_status, province_id, diocese_id,
                archdeaconry_id, deanery_id, parish_id, verification_token_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.organization_id)
            .bind(normalize_email(&data.email))
            .bind(data.password_hash)
            .bind(data.first_name.trim())
            .bind(data.last_name.trim())
            .bind(data.other_names)
            .bind(data.phone)
            .bind(data.gender)
            .bind(data.role_level)
            .bind(data.account_status)
            .bind(data.hierarchy.province_id)
            .bind(data.hierarchy.diocese_id)
            .bind(data.hierarchy.archdeaconry_id)
            .bind(data.hierarchy.deanery_id)
            .bind(data.hierarchy.parish_id)
            .bind(data.verification_token_hash)
            .fetch_one(conn)
            .await
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email address (case-insensitive)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE LOWER(email) = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&query)
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await
    }

    /// Replaces the personal section of a user's profile
    pub async fn update_personal(
        pool: &PgPool,
        id: Uuid,
        data: UpdatePersonal,
    ) -> Result<Option<Self>, sqlx::Error> {
        let data = data.normalized();
        let query = format!(
            r#"
            UPDATE users SET
                first_name = $2, last_name = $3, other_names = $4, phone = $5, gender = $6,
                date_of_birth = $7, marital_status = $8, address = $9, baptized = $10,
                baptism_date = $11, confirmed = $12, confirmation_date = $13,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(data.first_name.trim())
            .bind(data.last_name.trim())
            .bind(data.other_names)
            .bind(data.phone)
            .bind(data.gender)
            .bind(data.date_of_birth)
            .bind(data.marital_status)
            .bind(data.address)
            .bind(data.baptized)
            .bind(data.baptism_date)
            .bind(data.confirmed)
            .bind(data.confirmation_date)
            .fetch_optional(pool)
            .await
    }

    /// Stores the theme preference
    pub async fn update_theme(pool: &PgPool, id: Uuid, theme: Theme) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET theme = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(theme.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Updates the last login timestamp to the current time
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Consumes an email verification token
    ///
    /// Marks the email verified, clears the token, and activates the account
    /// if it was still pending. Suspended and inactive accounts keep their
    /// status. Returns None for an unknown or already-used token.
    pub async fn mark_email_verified(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE users SET
                email_verified = TRUE,
                verification_token_hash = NULL,
                account_status = CASE WHEN account_status = 'pending'
                                      THEN 'active'::account_status
                                      ELSE account_status END,
                updated_at = NOW()
            WHERE verification_token_hash = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&query)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Changes an account's status
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: AccountStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE users SET account_status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(pool)
            .await
    }

    /// Changes a user's role and records it in the audit trail
    ///
    /// Both writes share one transaction. The audit insert runs inside a
    /// savepoint: if it fails, the failure is logged, the savepoint is
    /// rolled back and the role change still commits.
    pub async fn change_role(
        pool: &PgPool,
        actor_id: Uuid,
        target_id: Uuid,
        new_role: RoleLevel,
        reason: Option<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let old_role: Option<RoleLevel> =
            sqlx::query_scalar("SELECT role_level FROM users WHERE id = $1 FOR UPDATE")
                .bind(target_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(old_role) = old_role else {
            tx.rollback().await?;
            return Ok(None);
        };

        let query = format!(
            "UPDATE users SET role_level = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(target_id)
            .bind(new_role)
            .fetch_one(&mut *tx)
            .await?;

        let mut savepoint = Connection::begin(&mut *tx).await?;
        match RoleAudit::record(&mut savepoint, actor_id, target_id, old_role, new_role, reason)
            .await
        {
            Ok(_) => savepoint.commit().await?,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    target_user_id = %target_id,
                    "Failed to write role audit entry; role change kept"
                );
                savepoint.rollback().await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            actor_id = %actor_id,
            target_user_id = %target_id,
            old_role = %old_role,
            new_role = %new_role,
            "Role changed"
        );

        Ok(Some(user))
    }

    /// Lists users inside a scope with optional filters, newest first
    pub async fn list_scoped(
        pool: &PgPool,
        scope: &ScopeFilter,
        filter: &MemberQuery,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut sql = format!(
            "SELECT {} FROM users u WHERE {}",
            prefixed_columns("u"),
            scope.clause
        );
        let next = filter.push_filters(&mut sql, scope.next_placeholder());
        sql.push_str(&format!(
            " ORDER BY u.last_name, u.first_name LIMIT ${} OFFSET ${}",
            next,
            next + 1
        ));

        let mut q = sqlx::query_as::<_, User>(&sql);
        for id in &scope.binds {
            q = q.bind(*id);
        }
        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(role) = filter.role {
            q = q.bind(role);
        }
        if let Some(pattern) = filter.search_pattern() {
            q = q.bind(pattern);
        }

        q.bind(filter.effective_limit())
            .bind(filter.effective_offset())
            .fetch_all(pool)
            .await
    }

    /// Counts users inside a scope matching the filters (ignores pagination)
    pub async fn count_scoped(
        pool: &PgPool,
        scope: &ScopeFilter,
        filter: &MemberQuery,
    ) -> Result<i64, sqlx::Error> {
        let mut sql = format!("SELECT COUNT(*) FROM users u WHERE {}", scope.clause);
        filter.push_filters(&mut sql, scope.next_placeholder());

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for id in &scope.binds {
            q = q.bind(*id);
        }
        if let Some(status) = filter.status {
            q = q.bind(status);
        }
        if let Some(role) = filter.role {
            q = q.bind(role);
        }
        if let Some(pattern) = filter.search_pattern() {
            q = q.bind(pattern);
        }

        q.fetch_one(pool).await
    }

    /// Finds one user, but only if they fall inside the scope
    pub async fn find_scoped(
        pool: &PgPool,
        scope: &ScopeFilter,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM users u WHERE {} AND u.id = ${}",
            prefixed_columns("u"),
            scope.clause,
            scope.next_placeholder()
        );

        let mut q = sqlx::query_as::<_, User>(&sql);
        for scope_id in &scope.binds {
            q = q.bind(*scope_id);
        }
        q.bind(id).fetch_optional(pool).await
    }

    /// Active users of an organization, for notification fan-out
    pub async fn list_active_in_organization(
        pool: &PgPool,
        organization_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM users WHERE organization_id = $1 AND account_status = 'active'
             ORDER BY last_name, first_name",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&query)
            .bind(organization_id)
            .fetch_all(pool)
            .await
    }
}

fn prefixed_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_rank_ordering() {
        for pair in RoleLevel::ALL.windows(2) {
            assert!(pair[0].rank() > pair[1].rank(), "{} > {}", pair[0], pair[1]);
        }
        assert!(RoleLevel::DioceseAdmin.has_permission(&RoleLevel::ParishAdmin));
        assert!(!RoleLevel::ParishAdmin.has_permission(&RoleLevel::DioceseAdmin));
        assert!(RoleLevel::Member.has_permission(&RoleLevel::Member));
    }

    #[test]
    fn test_role_round_trips_through_str() {
        for role in RoleLevel::ALL {
            assert_eq!(role.as_str().parse::<RoleLevel>(), Ok(role));
        }
        assert!("bishop".parse::<RoleLevel>().is_err());
    }

    #[test]
    fn test_role_serde_names() {
        let json = serde_json::to_string(&RoleLevel::ArchdeaconryAdmin).unwrap();
        assert_eq!(json, "\"archdeaconry_admin\"");
    }

    #[test]
    fn test_only_active_can_login() {
        assert!(AccountStatus::Active.can_login());
        assert!(AccountStatus::Active.login_refusal().is_none());
        for status in [
            AccountStatus::Pending,
            AccountStatus::Suspended,
            AccountStatus::Inactive,
        ] {
            assert!(!status.can_login());
            assert!(status.login_refusal().is_some());
        }
    }

    #[test]
    fn test_update_personal_clears_sacrament_dates() {
        let date = NaiveDate::from_ymd_opt(2001, 4, 15);
        let update = UpdatePersonal {
            first_name: "Ada".to_string(),
            last_name: "Obi".to_string(),
            baptized: false,
            baptism_date: date,
            confirmed: true,
            confirmation_date: date,
            ..Default::default()
        }
        .normalized();

        assert_eq!(update.baptism_date, None);
        assert_eq!(update.confirmation_date, date);
    }

    #[test]
    fn test_member_query_limits() {
        let q = MemberQuery {
            limit: Some(10_000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(q.effective_limit(), MemberQuery::MAX_LIMIT);
        assert_eq!(q.effective_offset(), 0);
        assert_eq!(MemberQuery::default().effective_limit(), MemberQuery::DEFAULT_LIMIT);
    }

    #[test]
    fn test_member_query_search_escapes_wildcards() {
        let q = MemberQuery {
            search: Some(" 50%_off ".to_string()),
            ..Default::default()
        };
        assert_eq!(q.search_pattern().as_deref(), Some("%50\\%\\_off%"));

        let blank = MemberQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.search_pattern(), None);
    }

    #[test]
    fn test_member_query_placeholders() {
        let q = MemberQuery {
            status: Some(AccountStatus::Active),
            search: Some("ada".to_string()),
            ..Default::default()
        };
        let mut sql = String::new();
        let next = q.push_filters(&mut sql, 3);
        assert_eq!(next, 5);
        assert!(sql.contains("u.account_status = $3"));
        assert!(sql.contains("u.first_name ILIKE $4"));
    }

    #[test]
    fn test_prefixed_columns() {
        let cols = prefixed_columns("u");
        assert!(cols.starts_with("u.id, u.organization_id"));
        assert!(cols.ends_with("u.last_login_at"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.ORG "), "ada@example.org");
    }
}
