//! Database migration CLI
//!
//! ```bash
//! ecclesia-migrate migrate
//! ecclesia-migrate rollback --steps 2
//! ecclesia-migrate status
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use ecclesia_api::config::Config;
use ecclesia_shared::db::{
    migrations::{
        ensure_database_exists, get_migration_status, rollback_migrations, run_migrations,
        MigrationStatus,
    },
    pool::{close_pool, create_pool_with_fallback},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "ecclesia-migrate")]
#[command(about = "Apply, revert and inspect Ecclesia database migrations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Apply every pending migration")]
    Migrate,

    #[command(about = "Revert the most recently applied migrations")]
    Rollback {
        #[arg(long, default_value_t = 1, help = "Number of migrations to revert")]
        steps: usize,
    },

    #[command(about = "List known migrations and whether they are applied")]
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecclesia_shared=info,ecclesia_migrate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    if matches!(cli.command, Command::Migrate) {
        ensure_database_exists(&config.database.url)
            .await
            .context("Failed to create database")?;
    }

    let pool = create_pool_with_fallback(
        config.database.pool_config(),
        config.database.pooler_url.as_deref(),
    )
    .await
    .context("Failed to connect to the database")?;

    let result = match cli.command {
        Command::Migrate => run_migrations(&pool)
            .await
            .context("Migration failed")
            .map(|()| println!("All migrations applied")),
        Command::Rollback { steps } => rollback_migrations(&pool, steps)
            .await
            .context("Rollback failed")
            .map(|reverted| {
                if reverted.is_empty() {
                    println!("Nothing to roll back");
                }
                for version in reverted {
                    println!("Reverted {}", version);
                }
            }),
        Command::Status => get_migration_status(&pool)
            .await
            .context("Failed to read migration status")
            .map(|status| print_status(&status)),
    };

    close_pool(pool).await;
    result
}

fn print_status(status: &MigrationStatus) {
    for entry in &status.entries {
        let state = match entry.applied_at {
            Some(at) => format!("applied {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => "pending".to_string(),
        };
        println!("{:>16}  {:<40} {}", entry.version, entry.description, state);
    }

    println!();
    println!(
        "{} applied, {} pending, latest {}",
        status.applied_count(),
        status.pending_count(),
        status
            .latest_version()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    if status.is_up_to_date() {
        println!("Database is up to date");
    }
}
