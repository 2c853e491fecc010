/// Outbound email
///
/// Messages go through a [`Mailer`]. Two transports exist:
///
/// - [`HttpMailer`]: JSON POST to a transactional email API (Brevo-style,
///   authenticated with an `api-key` header)
/// - [`LogMailer`]: writes the message to the log; the development default
///
/// [`template`] holds the `{{name}}` mail-merge renderer and the open/click
/// tracking helpers.
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::mail::{mailer_from_config, MailConfig, OutgoingEmail};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mailer = mailer_from_config(&MailConfig::default())?;
///
/// let email = OutgoingEmail::new("ada@example.org", "Welcome", "<p>Hello Ada</p>");
/// let message_id = mailer.send(&email).await?;
/// # Ok(())
/// # }
/// ```

pub mod http;
pub mod log;
pub mod template;

pub use http::HttpMailer;
pub use log::LogMailer;
pub use template::{render_html, render_template, LinkTracker, DEVELOPMENT_TRACKING_SECRET};

use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail configuration error: {0}")]
    Config(String),

    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Mail provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// One message to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

impl OutgoingEmail {
    pub fn new(
        to_email: impl Into<String>,
        subject: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Self {
        Self {
            to_email: to_email.into(),
            to_name: None,
            subject: subject.into(),
            html_body: html_body.into(),
            text_body: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.to_name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }
}

/// An email transport
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    /// Sends one message; returns the provider's message id when it has one
    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailTransport {
    Http,
    #[default]
    Log,
}

impl FromStr for MailTransport {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "api" => Ok(MailTransport::Http),
            "log" | "" => Ok(MailTransport::Log),
            other => Err(MailError::Config(format!("Unknown mail transport: {}", other))),
        }
    }
}

/// Mail settings, built from `MAIL_*` environment variables by the binaries
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransport,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from_email: String,
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::Log,
            api_url: None,
            api_key: None,
            from_email: "no-reply@ecclesia.local".to_string(),
            from_name: "Ecclesia".to_string(),
        }
    }
}

/// Builds the configured transport
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.transport {
        MailTransport::Log => Ok(Arc::new(LogMailer::new(&config.from_email))),
        MailTransport::Http => {
            let api_url = config
                .api_url
                .clone()
                .ok_or_else(|| MailError::Config("MAIL_API_URL is required".to_string()))?;
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| MailError::Config("MAIL_API_KEY is required".to_string()))?;

            let mailer = HttpMailer::new(api_url, api_key, &config.from_email, &config.from_name)?;
            Ok(Arc::new(mailer))
        }
    }
}
