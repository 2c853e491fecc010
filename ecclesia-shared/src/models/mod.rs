/// Database models for Ecclesia
///
/// Each model owns its SQL: structs derive `sqlx::FromRow` and expose
/// associated async functions taking a `PgPool` (or a connection when the
/// operation must join a caller's transaction).
///
/// # Models
///
/// - `organization`: church tenants and their subscription
/// - `hierarchy`: province → diocese → archdeaconry → deanery → parish
/// - `user`: member accounts, roles and scoped directory queries
/// - `profile`: employment, leadership, ministry and family sections
/// - `event` / `rsvp`: events, responses and reminder bookkeeping
/// - `campaign` / `email_log`: email campaigns and the outbound mail log
/// - `audit` / `activity`: role change audit trail and activity feed
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::models::organization::Organization;
/// use ecclesia_shared::models::user::User;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// if let Some(church) = Organization::find_by_slug(&pool, "st-peters").await? {
///     let members = Organization::count_users(&pool, church.id).await?;
///     println!("{} has {} members", church.name, members);
/// }
/// let user = User::find_by_email(&pool, "ada@example.org").await?;
/// # Ok(())
/// # }
/// ```

pub mod activity;
pub mod audit;
pub mod campaign;
pub mod email_log;
pub mod event;
pub mod hierarchy;
pub mod organization;
pub mod profile;
pub mod rsvp;
pub mod user;
