//! # Ecclesia Worker
//!
//! Background process for the church membership platform. It sends event
//! reminders, delivers queued campaign emails and removes expired sessions.
//!
//! ## Usage
//!
//! ```bash
//! # Poll forever
//! cargo run -p ecclesia-worker -- run
//!
//! # One pass of every job (or a single job), for cron
//! cargo run -p ecclesia-worker -- once
//! cargo run -p ecclesia-worker -- once --job reminders
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ecclesia_shared::{
    auth::session::SessionStore,
    db::pool::{close_pool, create_pool_with_fallback, get_pool_stats},
    mail::{mailer_from_config, LinkTracker},
};
use ecclesia_worker::{
    config::WorkerConfig,
    jobs::{CampaignDispatcher, Job, ReminderJob, SessionSweeper},
    scheduler::Scheduler,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ecclesia-worker")]
#[command(about = "Background jobs for Ecclesia", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every job on the configured interval until interrupted
    Run,

    /// Run a single pass and exit
    Once {
        /// Only run this job
        #[arg(long, value_enum)]
        job: Option<JobName>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum JobName {
    Reminders,
    Campaigns,
    Sessions,
}

impl JobName {
    fn as_str(self) -> &'static str {
        match self {
            JobName::Reminders => "reminders",
            JobName::Campaigns => "campaigns",
            JobName::Sessions => "sessions",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    tracing::info!(
        "Ecclesia Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = WorkerConfig::from_env().context("Invalid configuration")?;

    let pool = create_pool_with_fallback(config.database.clone(), config.pooler_url.as_deref())
        .await
        .context("Failed to connect to the database")?;

    let mailer = mailer_from_config(&config.mail).context("Invalid mail configuration")?;

    let sessions = SessionStore::new(pool.clone(), config.session_ttl);
    if !sessions.open().await {
        tracing::warn!("Sessions table not reachable; run migrations before starting the API");
    }

    let tracker = LinkTracker::new(config.public_base_url.clone(), &config.tracking_secret);

    let jobs: Vec<Arc<dyn Job>> = vec![
        Arc::new(ReminderJob::new(
            pool.clone(),
            mailer.clone(),
            config.reminder_window,
            tracker.clone(),
        )),
        Arc::new(CampaignDispatcher::new(
            pool.clone(),
            mailer,
            config.batch_size,
            tracker,
        )),
        Arc::new(SessionSweeper::new(sessions.clone())),
    ];

    let mut scheduler = Scheduler::new(config.poll_interval);
    let failures = match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            jobs.into_iter().for_each(|job| scheduler.register(job));

            let shutdown = scheduler.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown signal received, finishing current pass");
                }
                shutdown.cancel();
            });

            scheduler.run().await;
            None
        }
        Command::Once { job } => {
            jobs.into_iter()
                .filter(|j| job.map_or(true, |name| name.as_str() == j.name()))
                .for_each(|j| scheduler.register(j));

            let results = scheduler.run_pass().await;
            Some(results.iter().filter(|(_, r)| r.is_err()).count())
        }
    };

    let stats = get_pool_stats(&pool);
    tracing::debug!(
        active = stats.active_connections,
        idle = stats.idle_connections,
        "Closing worker"
    );
    sessions.close();
    close_pool(pool).await;

    if let Some(failed) = failures.filter(|n| *n > 0) {
        anyhow::bail!("{} job(s) failed", failed);
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "ecclesia_worker=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
