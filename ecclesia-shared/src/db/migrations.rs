/// Database migration runner
///
/// This module applies, reverts and reports on the SQL migrations embedded
/// from the workspace `migrations/` directory.
///
/// # Migration Files
///
/// Each migration is a pair of files named after a timestamp version:
/// - `{timestamp}_{name}.up.sql` - applied by `run_migrations`
/// - `{timestamp}_{name}.down.sql` - applied by `rollback_migrations`
///
/// Applied versions are tracked in the `_sqlx_migrations` table.
///
/// # Example
///
/// ```no_run
/// use ecclesia_shared::db::pool::{create_pool, DatabaseConfig};
/// use ecclesia_shared::db::migrations::{run_migrations, get_migration_status};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: std::env::var("DATABASE_URL")?,
///         ..Default::default()
///     };
///
///     let pool = create_pool(config).await?;
///     run_migrations(&pool).await?;
///
///     let status = get_migration_status(&pool).await?;
///     println!("{} applied, {} pending", status.applied_count(), status.pending_count());
///     Ok(())
/// }
/// ```

use chrono::{DateTime, Utc};
use sqlx::{
    migrate::{MigrateDatabase, MigrateError, Migrator},
    postgres::PgPool,
    Postgres,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Migrations embedded at compile time
pub static MIGRATOR: Migrator = sqlx::migrate!("../migrations");

/// State of a single known migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEntry {
    /// Timestamp version from the file name
    pub version: i64,

    /// Human readable description from the file name
    pub description: String,

    /// When the migration was applied (None = pending)
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationEntry {
    /// Whether this migration has been applied
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Every known migration, oldest first
    pub entries: Vec<MigrationEntry>,
}

impl MigrationStatus {
    /// Number of migrations that have been applied
    pub fn applied_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_applied()).count()
    }

    /// Number of migrations not yet applied
    pub fn pending_count(&self) -> usize {
        self.entries.len() - self.applied_count()
    }

    /// Latest applied migration version
    pub fn latest_version(&self) -> Option<i64> {
        self.entries
            .iter()
            .filter(|e| e.is_applied())
            .map(|e| e.version)
            .max()
    }

    /// Whether every known migration has been applied
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count() == 0
    }
}

/// Runs all pending database migrations
///
/// Each migration runs in its own transaction; a failing migration is rolled
/// back and the error returned.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    info!("Starting database migrations");

    match MIGRATOR.run(pool).await {
        Ok(()) => {
            info!("All database migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Migration failed: {}", e);
            Err(e)
        }
    }
}

/// Reverts the most recently applied migrations
///
/// `steps` is clamped to the number of applied migrations; `steps = 0`
/// is a no-op. Returns the versions that were reverted, newest first.
pub async fn rollback_migrations(pool: &PgPool, steps: usize) -> Result<Vec<i64>, MigrateError> {
    let applied = applied_versions(pool).await?;
    let mut newest_first: Vec<i64> = applied.into_keys().collect();
    newest_first.sort_unstable_by(|a, b| b.cmp(a));

    let Some(target) = rollback_target(&newest_first, steps) else {
        info!("Nothing to roll back");
        return Ok(Vec::new());
    };

    let reverted: Vec<i64> = newest_first
        .iter()
        .copied()
        .filter(|version| *version > target)
        .collect();

    info!(steps, target, count = reverted.len(), "Rolling back migrations");
    MIGRATOR.undo(pool, target).await?;
    info!("Rollback completed");

    Ok(reverted)
}

/// Computes the version to undo down to
///
/// `None` means there is nothing to revert. A target of 0 reverts everything.
fn rollback_target(applied_newest_first: &[i64], steps: usize) -> Option<i64> {
    if steps == 0 || applied_newest_first.is_empty() {
        return None;
    }

    Some(applied_newest_first.get(steps).copied().unwrap_or(0))
}

/// Gets the current migration status
///
/// Lists every embedded migration, marking those recorded as successfully
/// applied in the tracking table.
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    debug!("Checking migration status");

    let applied = applied_versions(pool).await?;

    let entries = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| MigrationEntry {
            version: m.version,
            description: m.description.to_string(),
            applied_at: applied.get(&m.version).copied(),
        })
        .collect();

    Ok(MigrationStatus { entries })
}

/// Reads applied versions from the tracking table
///
/// Returns an empty map when the tracking table does not exist yet.
async fn applied_versions(pool: &PgPool) -> Result<HashMap<i64, DateTime<Utc>>, sqlx::Error> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_name = '_sqlx_migrations'
        )",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        debug!("Migrations table does not exist yet");
        return Ok(HashMap::new());
    }

    let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
        "SELECT version, installed_on
         FROM _sqlx_migrations
         WHERE success = true",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Creates the database if it doesn't exist
///
/// Useful for development and testing; in production the database should
/// already exist.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), sqlx::Error> {
    info!("Checking if database exists");

    if !Postgres::database_exists(database_url).await? {
        info!("Database does not exist, creating it");
        Postgres::create_database(database_url).await?;
        info!("Database created successfully");
    } else {
        debug!("Database already exists");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_migrations_are_reversible() {
        let ups: Vec<i64> = MIGRATOR
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect();
        let downs: Vec<i64> = MIGRATOR
            .iter()
            .filter(|m| m.migration_type.is_down_migration())
            .map(|m| m.version)
            .collect();

        assert!(!ups.is_empty());
        assert_eq!(ups, downs);
    }

    #[test]
    fn test_rollback_target() {
        let applied = [30, 20, 10];
        assert_eq!(rollback_target(&applied, 0), None);
        assert_eq!(rollback_target(&applied, 1), Some(20));
        assert_eq!(rollback_target(&applied, 2), Some(10));
        assert_eq!(rollback_target(&applied, 3), Some(0));
        assert_eq!(rollback_target(&applied, 10), Some(0));
        assert_eq!(rollback_target(&[], 1), None);
    }

    #[test]
    fn test_migration_status_counts() {
        let status = MigrationStatus {
            entries: vec![
                MigrationEntry {
                    version: 1,
                    description: "one".to_string(),
                    applied_at: Some(Utc::now()),
                },
                MigrationEntry {
                    version: 2,
                    description: "two".to_string(),
                    applied_at: None,
                },
            ],
        };

        assert_eq!(status.applied_count(), 1);
        assert_eq!(status.pending_count(), 1);
        assert_eq!(status.latest_version(), Some(1));
        assert!(!status.is_up_to_date());
    }
}
