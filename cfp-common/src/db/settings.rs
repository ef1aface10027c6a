//! Settings table access
//!
//! Key-value runtime configuration: registration switch, submission window
//! and the generated secret key.

use crate::{time, Error, Result};
use chrono::{DateTime, Utc};
use rand::RngCore;
use sqlx::SqlitePool;
use tracing::info;

pub const REGISTRATION_DISABLED: &str = "registration_disabled";
pub const SUBMISSION_OPEN_DATE: &str = "submission_open_date";
pub const SUBMISSION_CLOSE_DATE: &str = "submission_close_date";
pub const SECRET_KEY: &str = "secret_key";

/// Submission window as stored in settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionWindow {
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
}

/// Create the settings table
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize default settings
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, REGISTRATION_DISABLED, "false").await?;
    Ok(())
}

/// Insert a setting with its default, or reset it when stored as NULL
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            info!("Reset NULL setting '{}' to default value: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Generic setting getter
pub async fn get_setting<T>(pool: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<Option<String>> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row.flatten() {
        Some(value) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T: ToString>(pool: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_setting(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn is_registration_disabled(pool: &SqlitePool) -> Result<bool> {
    Ok(get_setting::<bool>(pool, REGISTRATION_DISABLED)
        .await?
        .unwrap_or(false))
}

pub async fn set_registration_disabled(pool: &SqlitePool, disabled: bool) -> Result<()> {
    set_setting(pool, REGISTRATION_DISABLED, disabled).await
}

/// Load the submission window; `None` when not configured
pub async fn get_submission_window(pool: &SqlitePool) -> Result<Option<SubmissionWindow>> {
    let open: Option<String> = get_setting(pool, SUBMISSION_OPEN_DATE).await?;
    let close: Option<String> = get_setting(pool, SUBMISSION_CLOSE_DATE).await?;

    match (open, close) {
        (Some(open), Some(close)) => Ok(Some(SubmissionWindow {
            open_date: time::from_db(&open)?,
            close_date: time::from_db(&close)?,
        })),
        _ => Ok(None),
    }
}

pub async fn set_submission_window(pool: &SqlitePool, window: &SubmissionWindow) -> Result<()> {
    if window.close_date < window.open_date {
        return Err(Error::InvalidInput(
            "Submission close date must not be before the open date".to_string(),
        ));
    }
    set_setting(pool, SUBMISSION_OPEN_DATE, time::to_db(&window.open_date)).await?;
    set_setting(pool, SUBMISSION_CLOSE_DATE, time::to_db(&window.close_date)).await
}

pub async fn clear_submission_window(pool: &SqlitePool) -> Result<()> {
    delete_setting(pool, SUBMISSION_OPEN_DATE).await?;
    delete_setting(pool, SUBMISSION_CLOSE_DATE).await
}

/// Load the secret key, generating and persisting one on first use
pub async fn load_or_init_secret_key(pool: &SqlitePool) -> Result<String> {
    if let Some(key) = get_setting::<String>(pool, SECRET_KEY).await? {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();

    // Another process may have raced us; keep whichever row landed first
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(SECRET_KEY)
        .bind(&key)
        .execute(pool)
        .await?;

    info!("Generated new secret key");
    get_setting::<String>(pool, SECRET_KEY)
        .await?
        .ok_or_else(|| Error::Internal("Secret key missing after initialization".to_string()))
}
