//! Login session persistence
//!
//! Only the SHA-256 of a session token is stored.

use super::users::parse_uuid;
use cfp_common::{time, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_guid: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub async fn insert_session(
    pool: &SqlitePool,
    token_hash: &str,
    user_guid: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO sessions (token_hash, user_guid, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(token_hash)
    .bind(user_guid.to_string())
    .bind(time::to_db(&created_at))
    .bind(time::to_db(&expires_at))
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up an unexpired session
pub async fn find_session(
    pool: &SqlitePool,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRecord>> {
    let row = sqlx::query(
        "SELECT user_guid, created_at, expires_at FROM sessions WHERE token_hash = ? AND expires_at > ?",
    )
    .bind(token_hash)
    .bind(time::to_db(&now))
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let user_guid: String = row.try_get("user_guid")?;
    let created_at: String = row.try_get("created_at")?;
    let expires_at: String = row.try_get("expires_at")?;

    Ok(Some(SessionRecord {
        user_guid: parse_uuid(&user_guid)?,
        created_at: time::from_db(&created_at)?,
        expires_at: time::from_db(&expires_at)?,
    }))
}

pub async fn delete_session(pool: &SqlitePool, token_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop every session of a user except `keep`
pub async fn delete_user_sessions(
    pool: &SqlitePool,
    user_guid: Uuid,
    keep: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_guid = ? AND token_hash != ?")
        .bind(user_guid.to_string())
        .bind(keep.unwrap_or(""))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn purge_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(time::to_db(&now))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
