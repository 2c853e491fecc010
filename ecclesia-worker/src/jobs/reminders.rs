/// Event reminders
///
/// Finds scheduled events starting within the reminder window that have not
/// had a reminder yet, emails every member attending (or, when nobody has
/// responded, every active member of the church) and logs each email. The
/// event's `reminder_sent` flag is set before the first send, so a crash
/// mid-event skips the rest rather than mailing anyone twice.
///
/// Each email gets its log row before it is sent so the body can carry the
/// row's open pixel and tracked links. A failure on one recipient or one
/// event is logged and counted; it never holds up the rest of the scan.

use super::{format_event_time, merge_vars, Job, JobReport, JobResult, Recipient};
use async_trait::async_trait;
use chrono::Duration;
use ecclesia_shared::{
    mail::{render_html, render_template, LinkTracker, Mailer, OutgoingEmail},
    models::{
        email_log::{EmailKind, EmailLog, EmailStatus, NewEmailLog},
        event::Event,
        organization::Organization,
        rsvp::Rsvp,
        user::User,
    },
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SUBJECT: &str = "Reminder: {{event_title}}";

const BODY: &str = "<html><body>\
<p>Dear {{first_name}},</p>\
<p>This is a reminder that <strong>{{event_title}}</strong> at {{church}} \
starts on {{event_date}}.</p>\
<p>Location: {{event_location}}</p>\
<p>We look forward to seeing you.</p>\
</body></html>";

const TEXT: &str = "Dear {{first_name}},\n\n\
{{event_title}} at {{church}} starts on {{event_date}}.\n\
Location: {{event_location}}\n";

/// Events handled per pass
const EVENT_BATCH: i64 = 20;

pub struct ReminderJob {
    db: PgPool,
    mailer: Arc<dyn Mailer>,
    window: Duration,
    tracker: LinkTracker,
}

impl ReminderJob {
    pub fn new(db: PgPool, mailer: Arc<dyn Mailer>, window: Duration, tracker: LinkTracker) -> Self {
        Self {
            db,
            mailer,
            window,
            tracker,
        }
    }

    /// Attending members, or every active member when nobody responded
    async fn recipients(&self, event: &Event) -> JobResult<Vec<Recipient>> {
        if Rsvp::any_for_event(&self.db, event.id).await? {
            let attendees = Rsvp::attendees(&self.db, event.id).await?;
            return Ok(attendees
                .into_iter()
                .map(|a| Recipient {
                    user_id: a.user_id,
                    email: a.email,
                    first_name: a.first_name,
                    last_name: a.last_name,
                })
                .collect());
        }

        let members = User::list_active_in_organization(&self.db, event.organization_id).await?;
        Ok(members
            .into_iter()
            .map(|u| Recipient {
                user_id: u.id,
                email: u.email,
                first_name: u.first_name,
                last_name: u.last_name,
            })
            .collect())
    }

    async fn remind(&self, event: &Event) -> JobResult<JobReport> {
        let church = Organization::find_by_id(&self.db, event.organization_id)
            .await?
            .map(|o| o.name);
        let recipients = self.recipients(event).await?;
        let mut report = JobReport::default();

        if !Event::mark_reminder_sent(&self.db, event.id).await? {
            debug!(event_id = %event.id, "Reminder already handled");
            return Ok(report);
        }

        for recipient in recipients {
            let mut vars = merge_vars(
                Some(&recipient.first_name),
                Some(&recipient.last_name),
                church.as_deref(),
            );
            vars.insert("event_title".to_string(), event.title.clone());
            vars.insert("event_date".to_string(), format_event_time(event.starts_at));
            vars.insert(
                "event_location".to_string(),
                event.location.clone().unwrap_or_else(|| "to be announced".to_string()),
            );

            let subject = render_template(SUBJECT, &vars);
            let log = match EmailLog::insert(
                &self.db,
                NewEmailLog {
                    organization_id: Some(event.organization_id),
                    campaign_id: None,
                    event_id: Some(event.id),
                    user_id: Some(recipient.user_id),
                    kind: EmailKind::Reminder,
                    recipient_email: recipient.email.clone(),
                    subject: subject.clone(),
                    status: EmailStatus::Queued,
                    provider_message_id: None,
                    error: None,
                },
            )
            .await
            {
                Ok(log) => log,
                Err(e) => {
                    warn!(
                        event_id = %event.id,
                        user_id = %recipient.user_id,
                        error = %e,
                        "Could not log reminder; skipping recipient"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let html = self.tracker.add_tracking(&render_html(BODY, &vars), log.id);
            let email = OutgoingEmail::new(recipient.email.clone(), subject, html)
                .with_name(recipient.full_name())
                .with_text(render_template(TEXT, &vars));

            // Past this point the mail may be out; bookkeeping errors are only logged
            let outcome = match self.mailer.send(&email).await {
                Ok(message_id) => {
                    report.processed += 1;
                    EmailLog::mark_sent(&self.db, log.id, message_id.as_deref()).await
                }
                Err(e) => {
                    warn!(
                        event_id = %event.id,
                        user_id = %recipient.user_id,
                        error = %e,
                        "Reminder email failed"
                    );
                    report.failed += 1;
                    EmailLog::mark_failed(&self.db, log.id, &e.to_string()).await
                }
            };
            if let Err(e) = outcome {
                warn!(log_id = %log.id, error = %e, "Failed to record reminder outcome");
            }
        }

        info!(
            event_id = %event.id,
            sent = report.processed,
            failed = report.failed,
            "Event reminders sent"
        );

        Ok(report)
    }
}

#[async_trait]
impl Job for ReminderJob {
    fn name(&self) -> &'static str {
        "reminders"
    }

    async fn run_once(&self) -> JobResult<JobReport> {
        let events = Event::due_for_reminder(&self.db, self.window, EVENT_BATCH).await?;
        debug!(count = events.len(), "Events due for reminders");

        let mut total = JobReport::default();
        for event in events {
            match self.remind(&event).await {
                Ok(report) => {
                    total.processed += report.processed;
                    total.failed += report.failed;
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "Event reminders failed");
                    total.failed += 1;
                }
            }
        }

        Ok(total)
    }
}
