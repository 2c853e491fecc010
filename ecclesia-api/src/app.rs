/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use ecclesia_api::{app::AppState, config::Config};
/// use ecclesia_shared::mail::mailer_from_config;
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let mailer = mailer_from_config(&config.mail)?;
/// let state = AppState::new(pool, config, mailer);
/// let app = ecclesia_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use chrono::Duration;
use ecclesia_shared::auth::middleware::{require_auth, session_middleware, SessionLayer};
use ecclesia_shared::auth::session::SessionStore;
use ecclesia_shared::mail::{LinkTracker, Mailer};
use ecclesia_shared::models::profile::{
    Employment, FamilyMember, LeadershipRole, MinistryMembership,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Session persistence
    pub sessions: SessionStore,

    /// Outbound email transport
    pub mailer: Arc<dyn Mailer>,

    /// Signs and checks email tracking links
    pub tracker: LinkTracker,
}

impl AppState {
    pub fn new(db: PgPool, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let sessions = SessionStore::new(db.clone(), Duration::minutes(config.session.ttl_minutes));
        let tracker = LinkTracker::new(config.api.public_base_url.clone(), &config.tracking_secret);
        Self {
            db,
            config: Arc::new(config),
            sessions,
            mailer,
            tracker,
        }
    }

    /// Cookie and store settings for the session middleware
    pub fn session_layer(&self) -> SessionLayer {
        SessionLayer::new(
            self.sessions.clone(),
            self.config.session.cookie_name.clone(),
            self.config.secure_cookies(),
        )
    }

    /// Absolute URL under the public base
    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api.public_base_url, path)
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health, /access-denied          # public
/// ├── /t/open/:id, /t/click/:id        # email tracking (public)
/// └── /v1/
///     ├── /auth/                       # register, login, logout, verify (public), me
///     ├── /hierarchy/                  # registration form lookups (public)
///     ├── /mail/webhook                # provider callbacks (public, token-checked)
///     ├── /profile/                    # own profile and its sections
///     ├── /dashboard
///     ├── /members/                    # administrators
///     ├── /events/
///     ├── /campaigns/                  # administrators
///     └── /admin/churches/             # super administrators
/// ```
///
/// # Middleware Stack
///
/// Applied outermost first:
/// 1. Security headers
/// 2. CORS
/// 3. Request tracing
/// 4. Session load/persist (every route)
/// 5. Require-auth (protected routes only)
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/access-denied", get(routes::health::access_denied))
        .route("/t/open/:id", get(routes::tracking::track_open))
        .route("/t/click/:id", get(routes::tracking::track_click))
        .route("/v1/auth/register", post(routes::auth::register))
        .route("/v1/auth/login", post(routes::auth::login))
        .route("/v1/auth/logout", post(routes::auth::logout))
        .route("/v1/auth/verify", get(routes::auth::verify_email))
        .route("/v1/hierarchy/provinces", get(routes::hierarchy::list_provinces))
        .route(
            "/v1/hierarchy/provinces/:code/dioceses",
            get(routes::hierarchy::list_dioceses),
        )
        .route(
            "/v1/hierarchy/:level/:id/children",
            get(routes::hierarchy::list_children),
        )
        .route("/v1/mail/webhook", post(routes::tracking::provider_webhook));

    let profile_routes = Router::new()
        .route("/", get(routes::profile::get_profile))
        .route("/personal", put(routes::profile::update_personal))
        .route("/theme", put(routes::profile::update_theme))
        .merge(routes::profile::section_routes::<Employment>())
        .merge(routes::profile::section_routes::<LeadershipRole>())
        .merge(routes::profile::section_routes::<MinistryMembership>())
        .merge(routes::profile::section_routes::<FamilyMember>());

    let member_routes = Router::new()
        .route("/", get(routes::members::list_members))
        .route("/:id", get(routes::members::get_member))
        .route("/:id/role", put(routes::members::change_role))
        .route("/:id/status", put(routes::members::change_status));

    let event_routes = Router::new()
        .route(
            "/",
            get(routes::events::list_events).post(routes::events::create_event),
        )
        .route(
            "/:id",
            get(routes::events::get_event)
                .put(routes::events::update_event)
                .delete(routes::events::cancel_event),
        )
        .route("/:id/rsvp", post(routes::events::respond))
        .route("/:id/rsvps", get(routes::events::list_rsvps));

    let campaign_routes = Router::new()
        .route(
            "/",
            get(routes::campaigns::list_campaigns).post(routes::campaigns::create_campaign),
        )
        .route("/:id", get(routes::campaigns::get_campaign))
        .route("/:id/send", post(routes::campaigns::send_campaign));

    let admin_routes = Router::new()
        .route(
            "/churches",
            get(routes::admin::list_churches).post(routes::admin::create_church),
        )
        .route(
            "/churches/:id",
            get(routes::admin::get_church).put(routes::admin::update_church),
        )
        .route(
            "/churches/:id/subscription",
            put(routes::admin::update_subscription),
        );

    let protected_routes = Router::new()
        .route("/v1/auth/me", get(routes::auth::me))
        .route("/v1/dashboard", get(routes::dashboard::dashboard))
        .nest("/v1/profile", profile_routes)
        .nest("/v1/members", member_routes)
        .nest("/v1/events", event_routes)
        .nest("/v1/campaigns", campaign_routes)
        .nest("/v1/admin", admin_routes)
        .route_layer(middleware::from_fn(require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.session_layer(),
            session_middleware,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(!state.config.is_development()))
        .with_state(state)
}

/// CORS: any origin for `*`, otherwise the configured list with credentials
fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
