//! Database schema migrations
//!
//! Versioned, idempotent upgrades for databases created by older releases.
//! Fresh databases already have the current schema from `init`, so every
//! migration checks before altering and only the version is recorded.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations**
//! 2. **Always add new migrations** with the next version number
//! 3. **Use ALTER TABLE** to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Migration v1: uploaded file metadata columns on submissions
///
/// Early databases stored only the file path.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add file metadata columns to submissions");

    if !table_exists(pool, "submissions").await? {
        info!("  submissions table doesn't exist yet - skipping migration");
        return Ok(());
    }

    for (column, ddl) in [
        ("file_name", "ALTER TABLE submissions ADD COLUMN file_name TEXT"),
        ("file_content_type", "ALTER TABLE submissions ADD COLUMN file_content_type TEXT"),
        ("file_size", "ALTER TABLE submissions ADD COLUMN file_size INTEGER"),
        ("file_hash", "ALTER TABLE submissions ADD COLUMN file_hash TEXT"),
    ] {
        if has_column(pool, "submissions", column).await? {
            continue;
        }
        sqlx::query(ddl).execute(pool).await?;
        info!("  ✓ Added {} column to submissions", column);
    }

    Ok(())
}

/// Migration v2: cached review aggregates on submissions
///
/// Adds `review_count`, `total_score` and `average_score` and backfills them
/// from existing reviews.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add review aggregate columns to submissions");

    if !table_exists(pool, "submissions").await? {
        info!("  submissions table doesn't exist yet - skipping migration");
        return Ok(());
    }

    let mut added = false;
    for (column, ddl) in [
        (
            "review_count",
            "ALTER TABLE submissions ADD COLUMN review_count INTEGER NOT NULL DEFAULT 0",
        ),
        (
            "total_score",
            "ALTER TABLE submissions ADD COLUMN total_score INTEGER NOT NULL DEFAULT 0",
        ),
        ("average_score", "ALTER TABLE submissions ADD COLUMN average_score REAL"),
    ] {
        if has_column(pool, "submissions", column).await? {
            continue;
        }
        sqlx::query(ddl).execute(pool).await?;
        info!("  ✓ Added {} column to submissions", column);
        added = true;
    }

    if added && table_exists(pool, "reviews").await? {
        let updated = sqlx::query(
            r#"
            UPDATE submissions SET
                review_count = (SELECT COUNT(*) FROM reviews r WHERE r.submission_uuid = submissions.uuid),
                total_score = (SELECT COALESCE(SUM(submission_score), 0) FROM reviews r WHERE r.submission_uuid = submissions.uuid),
                average_score = (SELECT AVG(submission_score) FROM reviews r WHERE r.submission_uuid = submissions.uuid)
            "#,
        )
        .execute(pool)
        .await?
        .rows_affected();
        info!("  ✓ Backfilled review aggregates for {} submissions", updated);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn legacy_pool(temp_dir: &TempDir) -> SqlitePool {
        let db_url = format!("sqlite://{}?mode=rwc", temp_dir.path().join("legacy.db").display());
        let pool = SqlitePool::connect(&db_url).await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE submissions (
                uuid TEXT PRIMARY KEY,
                user_guid TEXT NOT NULL,
                submitted_on TEXT NOT NULL,
                title TEXT NOT NULL,
                authors TEXT NOT NULL DEFAULT '',
                contact_email TEXT NOT NULL,
                abstract TEXT NOT NULL DEFAULT '',
                conflicts TEXT NOT NULL DEFAULT '',
                file_path TEXT
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE reviews (
                uuid TEXT PRIMARY KEY,
                submission_uuid TEXT NOT NULL,
                user_guid TEXT NOT NULL,
                submitted_on TEXT NOT NULL,
                expertise_score INTEGER NOT NULL,
                submission_score INTEGER NOT NULL,
                comments TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_legacy_database_is_upgraded_and_backfilled() {
        let temp_dir = TempDir::new().unwrap();
        let pool = legacy_pool(&temp_dir).await;

        sqlx::query(
            "INSERT INTO submissions (uuid, user_guid, submitted_on, title, contact_email) \
             VALUES ('s1', 'u1', '2024-01-01T00:00:00Z', 'Talk', 'a@example.com'), \
                    ('s2', 'u1', '2024-01-02T00:00:00Z', 'Other', 'a@example.com')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO reviews (uuid, submission_uuid, user_guid, submitted_on, expertise_score, submission_score) \
             VALUES ('r1', 's1', 'u2', '2024-01-03T00:00:00Z', 3, 4), \
                    ('r2', 's1', 'u3', '2024-01-03T00:00:00Z', 2, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        assert!(has_column(&pool, "submissions", "file_hash").await.unwrap());
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);

        let (count, total, average): (i64, i64, Option<f64>) = sqlx::query_as(
            "SELECT review_count, total_score, average_score FROM submissions WHERE uuid = 's1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(total, 5);
        assert_eq!(average, Some(2.5));

        let (count, average): (i64, Option<f64>) = sqlx::query_as(
            "SELECT review_count, average_score FROM submissions WHERE uuid = 's2'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(average, None);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = legacy_pool(&temp_dir).await;
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
