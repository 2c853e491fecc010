/// The signed-in member's own profile
///
/// # Endpoints
///
/// - `GET /v1/profile` - Personal details plus every section
/// - `PUT /v1/profile/personal` - Replace the personal section
/// - `PUT /v1/profile/theme` - Store the colour theme
///
/// Each of `employment`, `leadership`, `ministry` and `family` has:
///
/// - `GET /v1/profile/<section>` - List rows
/// - `PUT /v1/profile/<section>` - Replace all rows (the section form)
/// - `POST /v1/profile/<section>` - Add one row
/// - `PUT /v1/profile/<section>/:id` - Update one row
/// - `DELETE /v1/profile/<section>/:id` - Delete one row
///
/// Every operation is bound to the caller's own user id.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{created, done, ok, ok_with_message, ApiResponse},
};
use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use ecclesia_shared::{
    auth::middleware::{CurrentUser, SessionContext},
    models::{
        activity::Activity,
        profile::{
            Employment, EmploymentInput, FamilyMember, FamilyMemberInput, LeadershipInput,
            LeadershipRole, MinistryInput, MinistryMembership, ProfileError,
        },
        user::{Theme, UpdatePersonal, User},
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// A repeatable profile section exposed under `/v1/profile/<PATH>`
#[async_trait]
pub trait ProfileSection: Serialize + Send + Sync + Sized + 'static {
    type Input: DeserializeOwned + Send + 'static;

    const PATH: &'static str;

    async fn list_rows(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error>;

    async fn add_row(pool: &PgPool, user_id: Uuid, input: Self::Input)
        -> Result<Self, ProfileError>;

    async fn update_row(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: Self::Input,
    ) -> Result<Self, ProfileError>;

    async fn delete_row(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError>;

    async fn replace_rows(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<Self::Input>,
    ) -> Result<Vec<Self>, ProfileError>;
}

#[async_trait]
impl ProfileSection for Employment {
    type Input = EmploymentInput;
    const PATH: &'static str = "employment";

    async fn list_rows(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        Employment::list_for_user(pool, user_id).await
    }

    async fn add_row(pool: &PgPool, user_id: Uuid, input: EmploymentInput) -> Result<Self, ProfileError> {
        Employment::add(pool, user_id, input).await
    }

    async fn update_row(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: EmploymentInput,
    ) -> Result<Self, ProfileError> {
        Employment::update(pool, user_id, id, input).await
    }

    async fn delete_row(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        Employment::delete(pool, user_id, id).await
    }

    async fn replace_rows(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<EmploymentInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        Employment::replace_all(pool, user_id, rows).await
    }
}

#[async_trait]
impl ProfileSection for LeadershipRole {
    type Input = LeadershipInput;
    const PATH: &'static str = "leadership";

    async fn list_rows(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        LeadershipRole::list_for_user(pool, user_id).await
    }

    async fn add_row(pool: &PgPool, user_id: Uuid, input: LeadershipInput) -> Result<Self, ProfileError> {
        LeadershipRole::add(pool, user_id, input).await
    }

    async fn update_row(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: LeadershipInput,
    ) -> Result<Self, ProfileError> {
        LeadershipRole::update(pool, user_id, id, input).await
    }

    async fn delete_row(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        LeadershipRole::delete(pool, user_id, id).await
    }

    async fn replace_rows(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<LeadershipInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        LeadershipRole::replace_all(pool, user_id, rows).await
    }
}

#[async_trait]
impl ProfileSection for MinistryMembership {
    type Input = MinistryInput;
    const PATH: &'static str = "ministry";

    async fn list_rows(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        MinistryMembership::list_for_user(pool, user_id).await
    }

    async fn add_row(pool: &PgPool, user_id: Uuid, input: MinistryInput) -> Result<Self, ProfileError> {
        MinistryMembership::add(pool, user_id, input).await
    }

    async fn update_row(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: MinistryInput,
    ) -> Result<Self, ProfileError> {
        MinistryMembership::update(pool, user_id, id, input).await
    }

    async fn delete_row(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        MinistryMembership::delete(pool, user_id, id).await
    }

    async fn replace_rows(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<MinistryInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        MinistryMembership::replace_all(pool, user_id, rows).await
    }
}

#[async_trait]
impl ProfileSection for FamilyMember {
    type Input = FamilyMemberInput;
    const PATH: &'static str = "family";

    async fn list_rows(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        FamilyMember::list_for_user(pool, user_id).await
    }

    async fn add_row(pool: &PgPool, user_id: Uuid, input: FamilyMemberInput) -> Result<Self, ProfileError> {
        FamilyMember::add(pool, user_id, input).await
    }

    async fn update_row(
        pool: &PgPool,
        user_id: Uuid,
        id: Uuid,
        input: FamilyMemberInput,
    ) -> Result<Self, ProfileError> {
        FamilyMember::update(pool, user_id, id, input).await
    }

    async fn delete_row(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<(), ProfileError> {
        FamilyMember::delete(pool, user_id, id).await
    }

    async fn replace_rows(
        pool: &PgPool,
        user_id: Uuid,
        rows: Vec<FamilyMemberInput>,
    ) -> Result<Vec<Self>, ProfileError> {
        FamilyMember::replace_all(pool, user_id, rows).await
    }
}

/// Routes for one section, relative to `/v1/profile`
pub fn section_routes<T: ProfileSection>() -> Router<AppState> {
    Router::new()
        .route(
            &format!("/{}", T::PATH),
            get(list_section::<T>)
                .put(replace_section::<T>)
                .post(add_section::<T>),
        )
        .route(
            &format!("/{}/:id", T::PATH),
            put(update_section::<T>).delete(delete_section::<T>),
        )
}

async fn list_section<T: ProfileSection>(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ApiResponse<Vec<T>>>> {
    Ok(ok(T::list_rows(&state.db, identity.user_id).await?))
}

async fn replace_section<T: ProfileSection>(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(rows): Json<Vec<T::Input>>,
) -> ApiResult<Json<ApiResponse<Vec<T>>>> {
    let saved = T::replace_rows(&state.db, identity.user_id, rows).await?;

    Activity::record(
        &state.db,
        Some(identity.user_id),
        Some(identity.organization_id),
        "profile_section_saved",
        json!({ "section": T::PATH, "rows": saved.len() }),
    )
    .await;

    Ok(ok_with_message("Saved", saved))
}

async fn add_section<T: ProfileSection>(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Json(input): Json<T::Input>,
) -> ApiResult<(StatusCode, Json<ApiResponse<T>>)> {
    let row = T::add_row(&state.db, identity.user_id, input).await?;
    Ok(created("Added", row))
}

async fn update_section<T: ProfileSection>(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<T::Input>,
) -> ApiResult<Json<ApiResponse<T>>> {
    let row = T::update_row(&state.db, identity.user_id, id, input).await?;
    Ok(ok_with_message("Updated", row))
}

async fn delete_section<T: ProfileSection>(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    T::delete_row(&state.db, identity.user_id, id).await?;
    Ok(done("Deleted"))
}

/// Full profile
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub employment: Vec<Employment>,
    pub leadership: Vec<LeadershipRole>,
    pub ministry: Vec<MinistryMembership>,
    pub family: Vec<FamilyMember>,

    /// Percentage of profile parts filled in
    pub completeness: u8,
}

/// Share of profile parts filled in, 0 to 100
///
/// Counts five personal fields and the employment, ministry and family
/// sections.
pub fn profile_completeness(user: &User, employment: usize, ministry: usize, family: usize) -> u8 {
    let parts = [
        user.phone.is_some(),
        user.gender.is_some(),
        user.date_of_birth.is_some(),
        user.marital_status.is_some(),
        user.address.is_some(),
        employment > 0,
        ministry > 0,
        family > 0,
    ];
    let filled = parts.iter().filter(|p| **p).count();
    ((filled * 100) / parts.len()) as u8
}

pub async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> ApiResult<Json<ApiResponse<ProfileResponse>>> {
    let user = User::find_by_id(&state.db, identity.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let (employment, leadership, ministry, family) = futures::try_join!(
        Employment::list_for_user(&state.db, user.id),
        LeadershipRole::list_for_user(&state.db, user.id),
        MinistryMembership::list_for_user(&state.db, user.id),
        FamilyMember::list_for_user(&state.db, user.id),
    )?;

    let completeness = profile_completeness(&user, employment.len(), ministry.len(), family.len());

    Ok(ok(ProfileResponse {
        user,
        employment,
        leadership,
        ministry,
        family,
        completeness,
    }))
}

/// Replace the personal section
///
/// Sacrament dates are dropped when their flag is off.
pub async fn update_personal(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    session: SessionContext,
    Json(data): Json<UpdatePersonal>,
) -> ApiResult<Json<ApiResponse<User>>> {
    let data = data.normalized();
    data.validate()?;

    let user = User::update_personal(&state.db, identity.user_id, data)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let display_name = user.full_name();
    session.update(|s| s.display_name = Some(display_name)).await;

    Activity::record(
        &state.db,
        Some(user.id),
        Some(user.organization_id),
        "profile_updated",
        json!({ "section": "personal" }),
    )
    .await;

    Ok(ok_with_message("Profile updated", user))
}

#[derive(Debug, Deserialize)]
pub struct ThemeRequest {
    pub theme: Theme,
}

pub async fn update_theme(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    session: SessionContext,
    Json(req): Json<ThemeRequest>,
) -> ApiResult<Json<ApiResponse<Theme>>> {
    if !User::update_theme(&state.db, identity.user_id, req.theme).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    session
        .update(|s| s.theme = Some(req.theme.as_str().to_string()))
        .await;

    Ok(ok(req.theme))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use ecclesia_shared::models::user::{AccountStatus, RoleLevel};
    use ecclesia_shared::validation::has_field;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            email: "ada@example.org".to_string(),
            password_hash: String::new(),
            first_name: "Ada".to_string(),
            last_name: "Obi".to_string(),
            other_names: None,
            phone: None,
            gender: None,
            date_of_birth: None,
            marital_status: None,
            address: None,
            baptized: false,
            baptism_date: None,
            confirmed: false,
            confirmation_date: None,
            role_level: RoleLevel::Member,
            province_id: None,
            diocese_id: None,
            archdeaconry_id: None,
            deanery_id: None,
            parish_id: None,
            account_status: AccountStatus::Active,
            theme: "light".to_string(),
            email_verified: true,
            verification_token_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_profile_completeness() {
        let mut u = user();
        assert_eq!(profile_completeness(&u, 0, 0, 0), 0);

        u.phone = Some("0800".to_string());
        u.gender = Some("female".to_string());
        u.date_of_birth = NaiveDate::from_ymd_opt(1990, 1, 1);
        u.marital_status = Some("single".to_string());
        assert_eq!(profile_completeness(&u, 0, 0, 0), 50);

        u.address = Some("Lagos".to_string());
        assert_eq!(profile_completeness(&u, 1, 2, 3), 100);
    }

    #[test]
    fn test_personal_validation() {
        let mut data = UpdatePersonal {
            first_name: "Ada".to_string(),
            last_name: " ".to_string(),
            ..Default::default()
        };
        let err = data.clone().normalized().validate().unwrap_err();
        assert!(has_field(&err, "last_name"));

        data.last_name = "Obi".to_string();
        assert!(data.clone().normalized().validate().is_ok());

        data.date_of_birth = Some(Utc::now().date_naive() + chrono::Duration::days(2));
        let err = data.normalized().validate().unwrap_err();
        assert!(has_field(&err, "date_of_birth"));
    }

    #[test]
    fn test_section_paths_are_distinct() {
        let paths = [
            Employment::PATH,
            LeadershipRole::PATH,
            MinistryMembership::PATH,
            FamilyMember::PATH,
        ];
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
    }
}
