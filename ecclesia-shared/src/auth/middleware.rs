/// Session middleware for Axum
///
/// [`session_middleware`] runs on every request. It reads the session cookie,
/// loads the [`SessionData`] from the [`SessionStore`], and adds two request
/// extensions:
///
/// - [`SessionContext`]: the mutable session, always present
/// - [`CurrentUser`]: the signed-in identity, only when there is one
///
/// After the handler returns, the session is written back (which refreshes
/// `last_activity`) and the cookie is issued, rotated or cleared as needed.
///
/// [`require_auth`] rejects requests without a [`CurrentUser`] with a 401
/// JSON envelope.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use ecclesia_shared::auth::middleware::{require_auth, session_middleware, CurrentUser, SessionLayer};
/// use ecclesia_shared::auth::session::SessionStore;
///
/// async fn me(CurrentUser(identity): CurrentUser) -> String {
///     identity.user_id.to_string()
/// }
///
/// # fn build(store: SessionStore) -> Router {
/// let layer = SessionLayer::new(store, "ECCLESIA_SESSID", true);
///
/// Router::new()
///     .route("/me", get(me))
///     .layer(middleware::from_fn(require_auth))
///     .layer(middleware::from_fn_with_state(layer, session_middleware))
/// # }
/// ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::scope::Identity;
use super::session::{SessionData, SessionStore};
use super::token::{generate_session_id, is_valid_token};

/// Cookie settings and the store, shared by every request
#[derive(Debug, Clone)]
pub struct SessionLayer {
    store: SessionStore,
    cookie_name: Arc<str>,
    secure: bool,
}

impl SessionLayer {
    pub fn new(store: SessionStore, cookie_name: impl Into<String>, secure: bool) -> Self {
        Self {
            store,
            cookie_name: Arc::from(cookie_name.into()),
            secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// `Set-Cookie` value carrying `session_id`
    pub fn issue_cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            self.cookie_name,
            session_id,
            self.store.ttl().num_seconds(),
            if self.secure { "; Secure" } else { "" }
        )
    }

    /// `Set-Cookie` value that removes the cookie
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            self.cookie_name,
            if self.secure { "; Secure" } else { "" }
        )
    }
}

#[derive(Debug, Default)]
struct SessionState {
    id: Option<String>,
    data: SessionData,
    changed: bool,
    rotate: bool,
    destroyed: bool,
}

/// The current request's session
///
/// Cloning is cheap; all clones share one state which the middleware
/// persists after the handler finishes.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionContext {
    fn new(id: Option<String>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                id,
                data,
                ..Default::default()
            })),
        }
    }

    /// Snapshot of the session data
    pub async fn data(&self) -> SessionData {
        self.inner.lock().await.data.clone()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.inner.lock().await.data.identity()
    }

    /// Mutates the session; the change is saved after the handler returns
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionData),
    {
        let mut state = self.inner.lock().await;
        f(&mut state.data);
        state.changed = true;
    }

    /// Replaces the session with a signed-in one under a fresh id
    pub async fn login(&self, data: SessionData) {
        let mut state = self.inner.lock().await;
        state.data = data;
        state.changed = true;
        state.rotate = true;
        state.destroyed = false;
    }

    /// Ends the session and clears the cookie
    pub async fn logout(&self) {
        let mut state = self.inner.lock().await;
        state.data = SessionData::default();
        state.destroyed = true;
        state.rotate = false;
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or(AuthError::SessionUnavailable)
    }
}

/// Identity of the signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or(AuthError::Unauthenticated)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Session layer is not installed")]
    SessionUnavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AuthError::SessionUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "session_unavailable")
            }
        };

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
            "error": code,
        }));

        (status, body).into_response()
    }
}

/// Value of cookie `name` in the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// Loads the session before the handler and persists it afterwards
pub async fn session_middleware(
    State(layer): State<SessionLayer>,
    mut req: Request,
    next: Next,
) -> Response {
    let session_id = cookie_value(req.headers(), &layer.cookie_name).filter(|id| is_valid_token(id));

    let data = match &session_id {
        Some(id) => layer.store.read(id).await,
        None => SessionData::default(),
    };

    if let Some(identity) = data.identity() {
        req.extensions_mut().insert(CurrentUser(identity));
    }

    let context = SessionContext::new(session_id, data);
    req.extensions_mut().insert(context.clone());

    let mut response = next.run(req).await;

    let state = context.inner.lock().await;
    let set_cookie = persist(&layer, &state).await;
    drop(state);

    if let Some(cookie) = set_cookie {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

/// Writes the session back; returns the `Set-Cookie` value to send, if any
async fn persist(layer: &SessionLayer, state: &SessionState) -> Option<String> {
    if state.destroyed {
        if let Some(id) = &state.id {
            layer.store.destroy(id).await;
        }
        return state.id.as_ref().map(|_| layer.clear_cookie());
    }

    if state.rotate {
        if let Some(old) = &state.id {
            layer.store.destroy(old).await;
        }
        return issue(layer, &state.data).await;
    }

    match &state.id {
        // Existing sessions are rewritten to refresh last_activity
        Some(id) if state.changed || state.data.is_authenticated() => {
            if layer.store.write(id, &state.data).await {
                return None;
            }
            // The row expired or was revoked; only anonymous state is reissued
            if state.changed && !state.data.is_authenticated() {
                return issue(layer, &state.data).await;
            }
            None
        }
        Some(_) => None,
        None if state.changed => issue(layer, &state.data).await,
        None => None,
    }
}

/// Stores `data` under a new id; returns the cookie for it
async fn issue(layer: &SessionLayer, data: &SessionData) -> Option<String> {
    let (new_id, _) = generate_session_id();
    if layer.store.create(&new_id, data).await {
        debug!("Session issued");
        Some(layer.issue_cookie(&new_id))
    } else {
        None
    }
}

/// Rejects requests that carry no signed-in identity
pub async fn require_auth(req: Request, next: Next) -> Result<Response, AuthError> {
    if req.extensions().get::<CurrentUser>().is_none() {
        return Err(AuthError::Unauthenticated);
    }

    Ok(next.run(req).await)
}
