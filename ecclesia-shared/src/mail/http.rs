/// Transactional email over HTTP
///
/// Posts one JSON document per message:
///
/// ```json
/// {
///   "sender": {"email": "...", "name": "..."},
///   "to": [{"email": "...", "name": "..."}],
///   "subject": "...",
///   "htmlContent": "...",
///   "textContent": "..."
/// }
/// ```
///
/// The key travels in the `api-key` header. A 2xx answer may carry
/// `{"messageId": "..."}`, which is kept so delivery webhooks can be matched
/// back to the `email_logs` row.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{MailError, Mailer, OutgoingEmail};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    html_content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_content: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl HttpMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| MailError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            from_name: from_name.into(),
        })
    }

    fn payload<'a>(&'a self, email: &'a OutgoingEmail) -> SendRequest<'a> {
        SendRequest {
            sender: Address {
                email: &self.from_email,
                name: Some(&self.from_name),
            },
            to: vec![Address {
                email: &email.to_email,
                name: email.to_name.as_deref(),
            }],
            subject: &email.subject,
            html_content: &email.html_body,
            text_content: email.text_body.as_deref(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), to = %email.to_email, "Mail provider rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // Some providers answer 202 with an empty body
        let message_id = response
            .json::<SendResponse>()
            .await
            .ok()
            .and_then(|r| r.message_id);

        debug!(to = %email.to_email, message_id = ?message_id, "Email accepted by provider");
        Ok(message_id)
    }
}
