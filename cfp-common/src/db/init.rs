//! Database initialization
//!
//! Creates the database on first run, applies the idempotent schema, runs
//! versioned migrations and seeds default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Name of the reviewers group
pub const PROGRAMME_COMMITTEE: &str = "Programme Committee";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection pragma: every pooled connection must enforce cascades
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    crate::db::settings::init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    crate::db::settings::create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_profiles_table(pool).await?;
    create_groups_tables(pool).await?;
    create_sessions_table(pool).await?;
    create_submissions_table(pool).await?;
    create_reviews_table(pool).await?;
    create_front_page_table(pool).await?;
    create_help_page_items_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            is_superuser INTEGER NOT NULL DEFAULT 0,
            date_joined TEXT NOT NULL,
            last_login TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            user_guid TEXT PRIMARY KEY REFERENCES users(guid) ON DELETE CASCADE,
            name TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            affiliation TEXT NOT NULL DEFAULT '',
            email_confirmed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_groups_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            name TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_groups (
            user_guid TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            group_name TEXT NOT NULL REFERENCES groups(name) ON DELETE CASCADE,
            PRIMARY KEY (user_guid, group_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO groups (name) VALUES (?)")
        .bind(PROGRAMME_COMMITTEE)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            uuid TEXT PRIMARY KEY,
            user_guid TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            submitted_on TEXT NOT NULL,
            title TEXT NOT NULL,
            authors TEXT NOT NULL DEFAULT '',
            contact_email TEXT NOT NULL,
            abstract TEXT NOT NULL DEFAULT '',
            conflicts TEXT NOT NULL DEFAULT '',
            file_path TEXT,
            file_name TEXT,
            file_content_type TEXT,
            file_size INTEGER,
            file_hash TEXT,
            review_count INTEGER NOT NULL DEFAULT 0,
            total_score INTEGER NOT NULL DEFAULT 0,
            average_score REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions(user_guid)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_reviews_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            uuid TEXT PRIMARY KEY,
            submission_uuid TEXT NOT NULL REFERENCES submissions(uuid) ON DELETE CASCADE,
            user_guid TEXT NOT NULL REFERENCES users(guid) ON DELETE CASCADE,
            submitted_on TEXT NOT NULL,
            expertise_score INTEGER NOT NULL DEFAULT 1
                CHECK (expertise_score BETWEEN 1 AND 5),
            submission_score INTEGER NOT NULL DEFAULT 1
                CHECK (submission_score BETWEEN 1 AND 5),
            comments TEXT NOT NULL DEFAULT '',
            UNIQUE (submission_uuid, user_guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_front_page_table(pool: &SqlitePool) -> Result<()> {
    // Singleton row: id is pinned to 1
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS front_page (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            lead_paragraph TEXT NOT NULL DEFAULT '',
            submission_guidance TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO front_page (id) VALUES (1)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_help_page_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS help_page_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            short_description TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            lead INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
