/// Scheduled jobs
///
/// Every job implements [`Job`]: one `run_once` pass that does whatever work
/// is due and reports how much it handled. The scheduler calls each job in
/// turn on every tick; `ecclesia-worker once` calls them a single time for
/// cron deployments.
///
/// # Job Contract
///
/// A pass must:
/// 1. Be safe to run concurrently with another worker process
/// 2. Treat a failure for one recipient as that recipient's failure only
/// 3. Return `Err` only when the pass itself could not proceed
///
/// # Example
///
/// ```no_run
/// use ecclesia_worker::jobs::{Job, JobReport, JobResult};
/// use async_trait::async_trait;
///
/// struct Noop;
///
/// #[async_trait]
/// impl Job for Noop {
///     fn name(&self) -> &'static str {
///         "noop"
///     }
///
///     async fn run_once(&self) -> JobResult<JobReport> {
///         Ok(JobReport::default())
///     }
/// }
/// ```

pub mod campaigns;
pub mod reminders;
pub mod sessions;

pub use campaigns::CampaignDispatcher;
pub use reminders::ReminderJob;
pub use sessions::SessionSweeper;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// Job error types
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Database unavailable or a query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type JobResult<T> = Result<T, JobError>;

/// Outcome of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Items handled successfully (emails sent, sessions removed)
    pub processed: u64,

    /// Items that failed and were recorded as such
    pub failed: u64,
}

impl JobReport {
    pub fn is_empty(&self) -> bool {
        self.processed == 0 && self.failed == 0
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} processed, {} failed", self.processed, self.failed)
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> JobResult<JobReport>;
}

/// Recipient of a job-sent email
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Recipient {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl Recipient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Mail-merge variables shared by every job-sent email
pub(crate) fn merge_vars(
    first_name: Option<&str>,
    last_name: Option<&str>,
    church: Option<&str>,
) -> HashMap<String, String> {
    let first = first_name.unwrap_or_default();
    let last = last_name.unwrap_or_default();

    HashMap::from([
        ("first_name".to_string(), first.to_string()),
        ("last_name".to_string(), last.to_string()),
        ("full_name".to_string(), format!("{} {}", first, last).trim().to_string()),
        ("church".to_string(), church.unwrap_or_default().to_string()),
    ])
}

/// Human-readable event time used in reminders and campaign emails
pub(crate) fn format_event_time(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%A %-d %B %Y, %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_merge_vars() {
        let vars = merge_vars(Some("Ada"), Some("Okafor"), Some("St. Peter's"));
        assert_eq!(vars["full_name"], "Ada Okafor");
        assert_eq!(vars["church"], "St. Peter's");

        let vars = merge_vars(None, Some("Okafor"), None);
        assert_eq!(vars["first_name"], "");
        assert_eq!(vars["full_name"], "Okafor");
    }

    #[test]
    fn test_format_event_time() {
        let at = Utc.with_ymd_and_hms(2025, 10, 5, 9, 30, 0).unwrap();
        assert_eq!(format_event_time(at), "Sunday 5 October 2025, 09:30 UTC");
    }

    #[test]
    fn test_report_display() {
        let report = JobReport {
            processed: 3,
            failed: 1,
        };
        assert_eq!(report.to_string(), "3 processed, 1 failed");
        assert!(JobReport::default().is_empty());
    }
}
