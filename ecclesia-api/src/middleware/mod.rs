/// Middleware modules for the API server
///
/// Session handling lives in `ecclesia_shared::auth::middleware`; this
/// module holds the response-side layers.
///
/// - `security`: Security headers

pub mod security;
