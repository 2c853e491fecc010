/// Expired session cleanup
///
/// Sessions idle longer than the configured lifetime can no longer be read
/// (the store checks age on read); this job deletes the rows.

use super::{Job, JobReport, JobResult};
use async_trait::async_trait;
use ecclesia_shared::auth::session::SessionStore;

pub struct SessionSweeper {
    store: SessionStore,
}

impl SessionSweeper {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for SessionSweeper {
    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn run_once(&self) -> JobResult<JobReport> {
        // Store errors are logged inside gc and count as nothing removed
        let removed = self.store.gc().await;
        Ok(JobReport {
            processed: removed,
            failed: 0,
        })
    }
}
