/// Health check and access-denied endpoints
///
/// # Endpoints
///
/// ```text
/// GET /health
/// GET /access-denied?reason=out_of_scope
/// ```
///
/// # Health response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "pool": { "size": 4, "idle": 3 }
/// }
/// ```

use crate::app::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use ecclesia_shared::db::pool::{get_pool_stats, health_check as db_health_check};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,

    pub version: String,

    /// "connected" or "disconnected"
    pub database: String,

    pub pool: PoolInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolInfo {
    pub size: usize,
    pub idle: usize,
}

/// Returns 200 when the database answers, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = db_health_check(&state.db).await.is_ok();
    let stats = get_pool_stats(&state.db);

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if connected { "healthy" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if connected { "connected" } else { "disconnected" }.to_string(),
            pool: PoolInfo {
                size: stats.total_connections,
                idle: stats.idle_connections,
            },
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct AccessDeniedQuery {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessDeniedResponse {
    pub success: bool,
    pub reason: String,
    pub message: &'static str,
}

/// Human-readable explanation for an access-denied reason code
pub fn reason_message(reason: &str) -> &'static str {
    match reason {
        "admin_required" => "This page is only available to church administrators.",
        "super_admin_required" => "This page is only available to super administrators.",
        "insufficient_role" => "Your role does not allow this action.",
        "self_role_change" => "You cannot change your own role.",
        "super_admin_grant" => "Only a super administrator can grant super administrator access.",
        "role_above_own" => "You cannot grant a role above your own.",
        "out_of_scope" => "This record is outside your jurisdiction.",
        "self_status_change" => "You cannot change your own account status.",
        "target_outranks" => "You cannot manage an administrator ranked above you.",
        _ => "You do not have permission to view this page.",
    }
}

/// Target of authorization redirects
pub async fn access_denied(
    Query(query): Query<AccessDeniedQuery>,
) -> (StatusCode, Json<AccessDeniedResponse>) {
    let reason = query
        .reason
        .filter(|r| r.len() <= 64 && r.chars().all(|c| c.is_ascii_lowercase() || c == '_'))
        .unwrap_or_else(|| "forbidden".to_string());

    (
        StatusCode::FORBIDDEN,
        Json(AccessDeniedResponse {
            success: false,
            message: reason_message(&reason),
            reason,
        }),
    )
}
