/// Worker scheduler
///
/// Runs every registered job once per tick until shutdown is requested.
///
/// # Architecture
///
/// ```text
/// Scheduler
///   ├─> ReminderJob: events starting soon
///   ├─> CampaignDispatcher: queued campaign emails
///   └─> SessionSweeper: expired sessions
/// ```
///
/// A failing job is logged and the remaining jobs still run; the next tick
/// retries it.
///
/// # Example
///
/// ```no_run
/// use ecclesia_worker::scheduler::Scheduler;
/// use std::time::Duration;
///
/// # async fn example() {
/// let scheduler = Scheduler::new(Duration::from_secs(60));
/// let shutdown = scheduler.shutdown_token();
///
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     shutdown.cancel();
/// });
///
/// scheduler.run().await;
/// # }
/// ```

use crate::jobs::{Job, JobReport, JobResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn register(&mut self, job: Arc<dyn Job>) {
        tracing::info!(job = job.name(), "Registering job");
        self.jobs.push(job);
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Used to signal graceful shutdown from external handlers
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs every job once, in registration order
    pub async fn run_pass(&self) -> Vec<(&'static str, JobResult<JobReport>)> {
        let mut results = Vec::with_capacity(self.jobs.len());

        for job in &self.jobs {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            let result = job.run_once().await;
            match &result {
                Ok(report) if report.is_empty() => {
                    tracing::debug!(job = job.name(), "Nothing to do");
                }
                Ok(report) => {
                    tracing::info!(
                        job = job.name(),
                        processed = report.processed,
                        failed = report.failed,
                        "Job pass finished"
                    );
                }
                Err(e) => {
                    tracing::error!(job = job.name(), error = %e, "Job pass failed");
                }
            }
            results.push((job.name(), result));
        }

        results
    }

    /// Ticks until the shutdown token is cancelled
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            jobs = ?self.job_names(),
            "Scheduler starting"
        );

        loop {
            self.run_pass().await;

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Scheduler shut down");
    }
}
