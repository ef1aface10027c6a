//! User, profile and group membership persistence
//!
//! A profile row is created in the same transaction as its user.

use cfp_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub guid: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub country: String,
    pub affiliation: String,
    pub email_confirmed: bool,
}

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub country: String,
    pub affiliation: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub email_confirmed: bool,
}

const USER_COLUMNS: &str =
    "guid, username, email, password_hash, is_active, is_superuser, date_joined, last_login";

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::InvalidInput(format!("Invalid UUID '{}': {}", value, e)))
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let guid: String = row.try_get("guid")?;
    let date_joined: String = row.try_get("date_joined")?;
    let last_login: Option<String> = row.try_get("last_login")?;

    Ok(User {
        guid: parse_uuid(&guid)?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
        is_superuser: row.try_get("is_superuser")?,
        date_joined: time::from_db(&date_joined)?,
        last_login: last_login.as_deref().map(time::from_db).transpose()?,
    })
}

/// Create a user and its profile atomically
pub async fn create_user(pool: &SqlitePool, new_user: &NewUser) -> Result<User> {
    let user = User {
        guid: Uuid::new_v4(),
        username: new_user.username.clone(),
        email: new_user.email.clone(),
        password_hash: new_user.password_hash.clone(),
        is_active: new_user.is_active,
        is_superuser: new_user.is_superuser,
        date_joined: time::now(),
        last_login: None,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO users (guid, username, email, password_hash, is_active, is_superuser, date_joined)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.guid.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.is_active)
    .bind(user.is_superuser)
    .bind(time::to_db(&user.date_joined))
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO profiles (user_guid, name, country, affiliation, email_confirmed)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.guid.to_string())
    .bind(&new_user.name)
    .bind(&new_user.country)
    .bind(&new_user.affiliation)
    .bind(new_user.email_confirmed)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(user)
}

pub async fn find_by_guid(pool: &SqlitePool, guid: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE guid = ?", USER_COLUMNS))
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS))
        .bind(username)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_user).transpose()
}

/// Active accounts registered with an email address (case-insensitive)
pub async fn find_active_by_email(pool: &SqlitePool, email: &str) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE lower(email) = lower(?) AND is_active = 1",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_user).collect()
}

pub async fn username_exists(pool: &SqlitePool, username: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
        .bind(username)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Whether another account already uses the email address
pub async fn email_in_use(pool: &SqlitePool, email: &str, excluding: Option<Uuid>) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower(?) AND guid != ?)",
    )
    .bind(email)
    .bind(excluding.map(|g| g.to_string()).unwrap_or_default())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Mark an account active with a confirmed email address
pub async fn activate(pool: &SqlitePool, guid: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE users SET is_active = 1 WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE profiles SET email_confirmed = 1 WHERE user_guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn set_password_hash(pool: &SqlitePool, guid: Uuid, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE guid = ?")
        .bind(password_hash)
        .bind(guid.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(pool: &SqlitePool, guid: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = ? WHERE guid = ?")
        .bind(time::to_db(&at))
        .bind(guid.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_profile(pool: &SqlitePool, guid: Uuid) -> Result<Profile> {
    let row = sqlx::query(
        "SELECT name, country, affiliation, email_confirmed FROM profiles WHERE user_guid = ?",
    )
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Profile for user {}", guid)))?;

    Ok(Profile {
        name: row.try_get("name")?,
        country: row.try_get("country")?,
        affiliation: row.try_get("affiliation")?,
        email_confirmed: row.try_get("email_confirmed")?,
    })
}

/// Update profile fields and the account email together
pub async fn update_profile(
    pool: &SqlitePool,
    guid: Uuid,
    name: &str,
    country: &str,
    affiliation: &str,
    email: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE profiles SET name = ?, country = ?, affiliation = ? WHERE user_guid = ?")
        .bind(name)
        .bind(country)
        .bind(affiliation)
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET email = ? WHERE guid = ?")
        .bind(email)
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn is_in_group(pool: &SqlitePool, guid: Uuid, group: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM user_groups WHERE user_guid = ? AND group_name = ?)",
    )
    .bind(guid.to_string())
    .bind(group)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn set_group_membership(
    pool: &SqlitePool,
    guid: Uuid,
    group: &str,
    member: bool,
) -> Result<()> {
    if member {
        sqlx::query("INSERT OR IGNORE INTO groups (name) VALUES (?)")
            .bind(group)
            .execute(pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_guid, group_name) VALUES (?, ?)")
            .bind(guid.to_string())
            .bind(group)
            .execute(pool)
            .await?;
    } else {
        sqlx::query("DELETE FROM user_groups WHERE user_guid = ? AND group_name = ?")
            .bind(guid.to_string())
            .bind(group)
            .execute(pool)
            .await?;
    }
    Ok(())
}
