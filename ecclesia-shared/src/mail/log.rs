/// Development transport: logs messages instead of sending them

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{MailError, Mailer, OutgoingEmail};

#[derive(Debug, Clone)]
pub struct LogMailer {
    from_email: String,
}

impl LogMailer {
    pub fn new(from_email: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError> {
        let message_id = format!("log-{}", Uuid::new_v4());

        info!(
            from = %self.from_email,
            to = %email.to_email,
            subject = %email.subject,
            message_id = %message_id,
            bytes = email.html_body.len(),
            "Email not sent (log transport)"
        );

        Ok(Some(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_returns_message_id() {
        let mailer = LogMailer::new("office@example.org");
        let id = mailer
            .send(&OutgoingEmail::new("a@example.org", "Hi", "<p>Hi</p>"))
            .await
            .unwrap()
            .unwrap();
        assert!(id.starts_with("log-"));
    }
}
