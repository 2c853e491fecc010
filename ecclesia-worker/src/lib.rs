///! # Ecclesia Worker Library
///!
///! Background jobs for the church membership platform.
///!
///! ## Modules
///!
///! - `config`: Worker configuration from the environment
///! - `jobs`: Event reminders, campaign delivery and session cleanup
///! - `scheduler`: Runs the jobs on a fixed interval
///!
///! ## Example
///!
///! ```no_run
///! use ecclesia_worker::{jobs::SessionSweeper, scheduler::Scheduler};
///! use ecclesia_shared::auth::session::SessionStore;
///! use std::{sync::Arc, time::Duration};
///!
///! # async fn example(pool: sqlx::PgPool) {
///! let mut scheduler = Scheduler::new(Duration::from_secs(60));
///! scheduler.register(Arc::new(SessionSweeper::new(SessionStore::new(
///!     pool,
///!     chrono::Duration::hours(24),
///! ))));
///! scheduler.run().await;
///! # }
///! ```

pub mod config;
pub mod jobs;
pub mod scheduler;
