/// Integration tests for database migrations
///
/// Skipped unless DATABASE_URL points at a PostgreSQL server.

mod common;

use common::test_pool;
use ecclesia_shared::db::migrations::{get_migration_status, run_migrations, MIGRATOR};

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let Some(pool) = test_pool().await else { return };

    let before = get_migration_status(&pool).await.expect("Failed to get status");
    run_migrations(&pool).await.expect("Second migration run failed");
    let after = get_migration_status(&pool).await.expect("Failed to get status");

    assert_eq!(before.applied_count(), after.applied_count());
    assert!(after.is_up_to_date());
}

#[tokio::test]
async fn test_status_lists_every_embedded_migration() {
    let Some(pool) = test_pool().await else { return };

    let status = get_migration_status(&pool).await.expect("Failed to get status");
    let ups = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .count();

    assert_eq!(status.entries.len(), ups);
    assert_eq!(status.pending_count(), 0);
    assert_eq!(status.latest_version(), status.entries.last().map(|e| e.version));
    assert!(status.entries.iter().all(|e| e.applied_at.is_some()));
}

#[tokio::test]
async fn test_migration_creates_all_tables() {
    let Some(pool) = test_pool().await else { return };

    let expected_tables = [
        "organizations",
        "provinces",
        "dioceses",
        "archdeaconries",
        "deaneries",
        "parishes",
        "users",
        "employment_records",
        "leadership_roles",
        "ministry_memberships",
        "family_members",
        "events",
        "event_rsvps",
        "email_campaigns",
        "email_logs",
        "role_audit_log",
        "activity_log",
        "sessions",
    ];

    for table_name in expected_tables {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = current_schema()
                AND table_name = $1
            )",
        )
        .bind(table_name)
        .fetch_one(&pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to check for table {}: {}", table_name, e));

        assert!(exists, "Table '{}' should exist after migrations", table_name);
    }
}

#[tokio::test]
async fn test_migration_creates_enums() {
    let Some(pool) = test_pool().await else { return };

    let expected_enums = [
        "role_level",
        "account_status",
        "subscription_status",
        "event_status",
        "rsvp_status",
        "campaign_status",
        "email_status",
        "email_kind",
    ];

    for enum_name in expected_enums {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT FROM pg_type WHERE typname = $1)")
                .bind(enum_name)
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|e| panic!("Failed to check for enum {}: {}", enum_name, e));

        assert!(exists, "Enum '{}' should exist after migrations", enum_name);
    }
}
