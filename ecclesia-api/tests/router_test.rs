/// Router tests that need no database
///
/// The router is built over a lazily-connected pool pointing at a closed
/// port, so these cover routing, middleware and every path that answers
/// before touching PostgreSQL.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{lazy_app, send};
use serde_json::json;

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let app = lazy_app(&[]);
    let (status, _, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "disconnected");
}

#[tokio::test]
async fn test_protected_routes_require_a_session() {
    let app = lazy_app(&[]);

    for uri in ["/v1/auth/me", "/v1/dashboard", "/v1/profile", "/v1/members", "/v1/admin/churches"] {
        let (status, _, body) = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unauthenticated");
    }
}

#[tokio::test]
async fn test_access_denied_page() {
    let app = lazy_app(&[]);

    let (status, _, body) = send(
        &app,
        Method::GET,
        "/access-denied?reason=target_outranks",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "target_outranks");
    assert!(body["message"].as_str().unwrap().contains("ranked above"));

    let (_, _, body) = send(
        &app,
        Method::GET,
        "/access-denied?reason=%3Cscript%3E",
        None,
        None,
    )
    .await;
    assert_eq!(body["reason"], "forbidden");
}

#[tokio::test]
async fn test_hierarchy_catalogue_is_public() {
    let app = lazy_app(&[]);

    let (status, _, body) = send(&app, Method::GET, "/v1/hierarchy/provinces", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().is_some_and(|p| !p.is_empty()));

    let (status, _, body) = send(
        &app,
        Method::GET,
        "/v1/hierarchy/provinces/lagos/dioceses",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|d| d["code"] == "lagos-west"));

    let (status, _, _) = send(
        &app,
        Method::GET,
        "/v1/hierarchy/provinces/atlantis/dioceses",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let app = lazy_app(&[]);
    let (_, headers, _) = send(&app, Method::GET, "/v1/hierarchy/provinces", None, None).await;

    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    // Development configuration: no HSTS
    assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());
}

#[tokio::test]
async fn test_register_validates_before_touching_the_database() {
    let app = lazy_app(&[]);

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "church": "st-peters",
            "email": "not-an-email",
            "password": "Harvest2025Praise",
            "first_name": "Ada",
            "last_name": "Okafor",
            "province": "lagos",
            "diocese": "lagos-west",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["errors"][0]["field"], "email");
}

#[tokio::test]
async fn test_register_rejects_weak_password() {
    let app = lazy_app(&[]);

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/auth/register",
        None,
        Some(json!({
            "church": "st-peters",
            "email": "ada@example.org",
            "password": "short",
            "first_name": "Ada",
            "last_name": "Okafor",
            "province": "lagos",
            "diocese": "lagos-west",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "password");
}

#[tokio::test]
async fn test_click_tracking_refuses_unsigned_links() {
    let app = lazy_app(&[]);
    let id = uuid::Uuid::new_v4();

    let (status, _, _) = send(
        &app,
        Method::GET,
        &format!("/t/click/{}?url=javascript:alert(1)&sig=00", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(&app, Method::GET, &format!("/t/click/{}", id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Any https target without our signature is refused before the database
    let (status, _, _) = send(
        &app,
        Method::GET,
        &format!("/t/click/{}?url=https%3A%2F%2Fevil.example%2F&sig=deadbeef", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mail_webhook_checks_token() {
    let app = lazy_app(&[("MAIL_WEBHOOK_TOKEN", "s3cret")]);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/v1/mail/webhook?token=wrong",
        None,
        Some(json!({ "event": "delivered", "message-id": "m1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_mail_webhook_ignores_unknown_events() {
    let app = lazy_app(&[]);

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/mail/webhook",
        None,
        Some(json!({ "event": "unsubscribed", "message-id": "m1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["received"], 1);
    assert_eq!(body["data"]["ignored"], 1);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = lazy_app(&[]);
    let (status, _, _) = send(&app, Method::GET, "/v1/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
