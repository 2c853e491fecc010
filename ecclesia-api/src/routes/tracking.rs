/// Email engagement tracking and provider callbacks
///
/// # Endpoints
///
/// - `GET /t/open/:id` - Open pixel; marks the log row opened
/// - `GET /t/click/:id?url=&sig=` - Marks the log row clicked and redirects
/// - `POST /v1/mail/webhook` - Delivery notifications from the email provider
///
/// The pixel never fails visibly: database errors are logged and the image is
/// still served. A click only redirects when its signature matches and the
/// log row exists; anything else is a 404.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{ok, ApiResponse},
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use ecclesia_shared::{
    mail::template::is_trackable_url,
    models::email_log::{EmailLog, ProviderEvent},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Transparent 1x1 GIF
static PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub async fn track_open(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if let Err(e) = EmailLog::mark_opened(&state.db, id).await {
        warn!(email_log_id = %id, error = %e, "Failed to record email open");
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
        ],
        PIXEL_GIF.as_slice(),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
    pub sig: Option<String>,
}

fn unknown_link() -> ApiError {
    ApiError::NotFound("Link not found".to_string())
}

/// Follows a link written into one of our emails
///
/// The signature ties the target to the log row, so the endpoint cannot be
/// used to bounce readers to arbitrary sites.
pub async fn track_click(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ClickQuery>,
) -> ApiResult<Redirect> {
    let (Some(target), Some(sig)) = (query.url, query.sig) else {
        return Err(unknown_link());
    };
    if !is_trackable_url(&target) || !state.tracker.verify_click(id, &target, &sig) {
        debug!(email_log_id = %id, "Rejecting unsigned click link");
        return Err(unknown_link());
    }

    match EmailLog::mark_clicked(&state.db, id).await {
        Ok(true) => Ok(Redirect::to(&target)),
        Ok(false) => Err(unknown_link()),
        Err(e) => {
            // The signature already proves we issued this link
            warn!(email_log_id = %id, error = %e, "Failed to record email click");
            Ok(Redirect::to(&target))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookAuth {
    pub token: Option<String>,
}

/// One provider notification
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderNotification {
    pub event: String,

    #[serde(alias = "message-id", alias = "messageId")]
    pub message_id: Option<String>,

    pub reason: Option<String>,
}

/// Providers post either a single notification or a batch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Batch(Vec<ProviderNotification>),
    Single(ProviderNotification),
}

impl WebhookPayload {
    fn into_notifications(self) -> Vec<ProviderNotification> {
        match self {
            WebhookPayload::Batch(items) => items,
            WebhookPayload::Single(item) => vec![item],
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct WebhookResult {
    pub received: usize,
    pub applied: u64,
    pub ignored: usize,
}

pub async fn provider_webhook(
    State(state): State<AppState>,
    Query(auth): Query<WebhookAuth>,
    Json(payload): Json<WebhookPayload>,
) -> ApiResult<Json<ApiResponse<WebhookResult>>> {
    if let Some(expected) = state.config.mail_webhook_token.as_deref() {
        if auth.token.as_deref() != Some(expected) {
            return Err(ApiError::Unauthorized("Invalid webhook token".to_string()));
        }
    }

    let notifications = payload.into_notifications();
    let mut result = WebhookResult {
        received: notifications.len(),
        ..Default::default()
    };

    for notification in notifications {
        let (Some(event), Some(message_id)) = (
            ProviderEvent::parse(&notification.event),
            notification.message_id.as_deref(),
        ) else {
            debug!(event = %notification.event, "Ignoring provider notification");
            result.ignored += 1;
            continue;
        };

        result.applied += EmailLog::apply_provider_event(
            &state.db,
            message_id,
            event,
            notification.reason.as_deref(),
        )
        .await?;
    }

    Ok(ok(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pixel_is_gif() {
        assert_eq!(&PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(PIXEL_GIF[PIXEL_GIF.len() - 1], 0x3b);
    }

    #[test]
    fn test_webhook_single_payload() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "event": "delivered",
            "message-id": "<abc@relay>",
        }))
        .unwrap();

        let items = payload.into_notifications();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message_id.as_deref(), Some("<abc@relay>"));
    }

    #[test]
    fn test_webhook_batch_payload() {
        let payload: WebhookPayload = serde_json::from_value(json!([
            { "event": "hard_bounce", "message_id": "m1", "reason": "mailbox unknown" },
            { "event": "opened", "messageId": "m2" },
        ]))
        .unwrap();

        let items = payload.into_notifications();
        assert_eq!(items.len(), 2);
        assert_eq!(ProviderEvent::parse(&items[0].event), Some(ProviderEvent::Bounced));
        assert_eq!(items[1].message_id.as_deref(), Some("m2"));
    }
}
