/// Campaign delivery
///
/// Queueing a campaign (API side) writes one `queued` log row per recipient.
/// Each pass here:
/// 1. Moves queued campaigns to `sending`
/// 2. Claims a batch of queued rows and commits the claim
/// 3. Renders subject and body per recipient, adds tracking, sends
/// 4. Marks each row sent or failed on its own
/// 5. Finalizes campaigns with nothing left queued
///
/// A claimed row is invisible to other workers for [`CLAIM_LEASE_MINUTES`]. Once a
/// send has happened its outcome is recorded best effort; an error there is
/// logged and never fails the pass, so nothing already sent is retried.

use super::{format_event_time, merge_vars, Job, JobReport, JobResult};
use async_trait::async_trait;
use chrono::Duration;
use ecclesia_shared::{
    mail::{render_html, render_template, LinkTracker, Mailer, OutgoingEmail},
    models::{
        campaign::Campaign,
        email_log::{EmailLog, QueuedEmail},
    },
};
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};

/// How long a claimed email stays reserved for the worker that took it
pub const CLAIM_LEASE_MINUTES: i64 = 15;

pub struct CampaignDispatcher {
    db: PgPool,
    mailer: Arc<dyn Mailer>,
    batch_size: i64,
    tracker: LinkTracker,
}

/// Mail-merge variables for one claimed email
fn campaign_vars(email: &QueuedEmail) -> HashMap<String, String> {
    let mut vars = merge_vars(
        email.first_name.as_deref(),
        email.last_name.as_deref(),
        email.organization_name.as_deref(),
    );
    vars.insert("email".to_string(), email.recipient_email.clone());
    if let Some(title) = &email.event_title {
        vars.insert("event_title".to_string(), title.clone());
    }
    if let Some(starts_at) = email.event_starts_at {
        vars.insert("event_date".to_string(), format_event_time(starts_at));
    }
    if let Some(location) = &email.event_location {
        vars.insert("event_location".to_string(), location.clone());
    }
    vars
}

/// Plain-text bodies keep paragraph breaks as HTML paragraphs
fn body_html(template: &str, vars: &HashMap<String, String>) -> String {
    let rendered = render_html(template, vars);
    if rendered.trim_start().starts_with('<') {
        return rendered;
    }

    let paragraphs: String = rendered
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", p.replace('\n', "<br>")))
        .collect();
    format!("<html><body>{}</body></html>", paragraphs)
}

impl CampaignDispatcher {
    pub fn new(db: PgPool, mailer: Arc<dyn Mailer>, batch_size: i64, tracker: LinkTracker) -> Self {
        Self {
            db,
            mailer,
            batch_size,
            tracker,
        }
    }

    fn build_email(&self, queued: &QueuedEmail) -> OutgoingEmail {
        let vars = campaign_vars(queued);
        let subject = render_template(&queued.subject, &vars);
        let html = self
            .tracker
            .add_tracking(&body_html(&queued.body_template, &vars), queued.id);

        OutgoingEmail::new(queued.recipient_email.clone(), subject, html)
            .with_name(vars.get("full_name").cloned().unwrap_or_default())
            .with_text(render_template(&queued.body_template, &vars))
    }

    async fn deliver_batch(&self) -> JobResult<JobReport> {
        let mut report = JobReport::default();

        let batch = EmailLog::claim_queued(
            &self.db,
            self.batch_size,
            Duration::minutes(CLAIM_LEASE_MINUTES),
        )
        .await?;
        if batch.is_empty() {
            return Ok(report);
        }
        debug!(count = batch.len(), "Claimed queued campaign emails");

        for queued in &batch {
            let email = self.build_email(queued);
            let outcome = match self.mailer.send(&email).await {
                Ok(message_id) => {
                    report.processed += 1;
                    EmailLog::mark_sent(&self.db, queued.id, message_id.as_deref()).await
                }
                Err(e) => {
                    warn!(
                        campaign_id = %queued.campaign_id,
                        email_log_id = %queued.id,
                        error = %e,
                        "Campaign email failed"
                    );
                    report.failed += 1;
                    EmailLog::mark_failed(&self.db, queued.id, &e.to_string()).await
                }
            };
            if let Err(e) = outcome {
                warn!(email_log_id = %queued.id, error = %e, "Failed to record campaign email outcome");
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl Job for CampaignDispatcher {
    fn name(&self) -> &'static str {
        "campaigns"
    }

    async fn run_once(&self) -> JobResult<JobReport> {
        let in_flight = Campaign::in_flight(&self.db).await?;
        if in_flight.is_empty() {
            return Ok(JobReport::default());
        }

        for id in &in_flight {
            Campaign::mark_sending(&self.db, *id).await?;
        }

        let report = self.deliver_batch().await?;

        for id in in_flight {
            if let Some(campaign) = Campaign::finalize(&self.db, id).await? {
                info!(
                    campaign_id = %campaign.id,
                    status = ?campaign.status,
                    recipients = campaign.recipient_count,
                    "Campaign delivery finished"
                );
            }
        }

        Ok(report)
    }
}
