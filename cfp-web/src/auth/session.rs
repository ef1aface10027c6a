//! Session tokens
//!
//! A login hands the client a random 256-bit token; the database keeps its
//! SHA-256 hash. Clients present it as a bearer token or in the
//! `cfp_session` cookie.

use crate::db::sessions;
use crate::error::ApiResult;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "cfp_session";

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Create a session row and return the raw token
pub async fn start_session(
    pool: &SqlitePool,
    user_guid: Uuid,
    now: DateTime<Utc>,
    ttl_hours: i64,
) -> ApiResult<String> {
    let token = generate_token();
    sessions::insert_session(
        pool,
        &hash_token(&token),
        user_guid,
        now,
        now + Duration::hours(ttl_hours),
    )
    .await?;
    Ok(token)
}

pub async fn end_session(pool: &SqlitePool, token: &str) -> ApiResult<()> {
    sessions::delete_session(pool, &hash_token(token)).await?;
    Ok(())
}

/// Token from `Authorization: Bearer` or the session cookie
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|t| !t.is_empty())
}

pub fn session_cookie(token: &str, ttl_hours: i64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl_hours * 60 * 60
    )
}

pub fn clear_session_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", SESSION_COOKIE)
}
