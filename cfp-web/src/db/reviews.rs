//! Review persistence and submission score aggregates
//!
//! Every write recomputes `review_count`, `total_score` and `average_score`
//! of the affected submission inside the same transaction.

use super::users::parse_uuid;
use cfp_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub uuid: Uuid,
    pub submission_uuid: Uuid,
    pub user_guid: Uuid,
    pub reviewer: String,
    pub submitted_on: DateTime<Utc>,
    pub expertise_score: i64,
    pub submission_score: i64,
    pub comments: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ReviewScores<'a> {
    pub expertise_score: i64,
    pub submission_score: i64,
    pub comments: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreAggregate {
    pub review_count: i64,
    pub total_score: i64,
    pub average_score: Option<f64>,
}

const REVIEW_SELECT: &str = r#"
    SELECT r.uuid, r.submission_uuid, r.user_guid, COALESCE(u.username, '') AS reviewer,
           r.submitted_on, r.expertise_score, r.submission_score, r.comments
    FROM reviews r
    LEFT JOIN users u ON u.guid = r.user_guid
"#;

fn row_to_review(row: &SqliteRow) -> Result<Review> {
    let uuid: String = row.try_get("uuid")?;
    let submission_uuid: String = row.try_get("submission_uuid")?;
    let user_guid: String = row.try_get("user_guid")?;
    let submitted_on: String = row.try_get("submitted_on")?;

    Ok(Review {
        uuid: parse_uuid(&uuid)?,
        submission_uuid: parse_uuid(&submission_uuid)?,
        user_guid: parse_uuid(&user_guid)?,
        reviewer: row.try_get("reviewer")?,
        submitted_on: time::from_db(&submitted_on)?,
        expertise_score: row.try_get("expertise_score")?,
        submission_score: row.try_get("submission_score")?,
        comments: row.try_get("comments")?,
    })
}

/// Recompute the aggregate columns of one submission
async fn recompute_scores(
    tx: &mut Transaction<'_, Sqlite>,
    submission_uuid: Uuid,
) -> Result<ScoreAggregate> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS review_count,
               COALESCE(SUM(submission_score), 0) AS total_score
        FROM reviews WHERE submission_uuid = ?
        "#,
    )
    .bind(submission_uuid.to_string())
    .fetch_one(&mut **tx)
    .await?;

    let review_count: i64 = row.try_get("review_count")?;
    let total_score: i64 = row.try_get("total_score")?;
    let average_score = (review_count > 0).then(|| total_score as f64 / review_count as f64);

    sqlx::query(
        "UPDATE submissions SET review_count = ?, total_score = ?, average_score = ? WHERE uuid = ?",
    )
    .bind(review_count)
    .bind(total_score)
    .bind(average_score)
    .bind(submission_uuid.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(ScoreAggregate {
        review_count,
        total_score,
        average_score,
    })
}

pub async fn create_review(
    pool: &SqlitePool,
    submission_uuid: Uuid,
    user_guid: Uuid,
    scores: ReviewScores<'_>,
) -> Result<(Uuid, ScoreAggregate)> {
    let uuid = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO reviews (uuid, submission_uuid, user_guid, submitted_on,
                             expertise_score, submission_score, comments)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid.to_string())
    .bind(submission_uuid.to_string())
    .bind(user_guid.to_string())
    .bind(time::to_db(&time::now()))
    .bind(scores.expertise_score)
    .bind(scores.submission_score)
    .bind(scores.comments)
    .execute(&mut *tx)
    .await?;

    let aggregate = recompute_scores(&mut tx, submission_uuid).await?;
    tx.commit().await?;

    Ok((uuid, aggregate))
}

pub async fn update_review(
    pool: &SqlitePool,
    uuid: Uuid,
    scores: ReviewScores<'_>,
) -> Result<ScoreAggregate> {
    let mut tx = pool.begin().await?;

    let submission_uuid: Option<String> =
        sqlx::query_scalar("SELECT submission_uuid FROM reviews WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;
    let submission_uuid = parse_uuid(
        &submission_uuid.ok_or_else(|| Error::NotFound(format!("Review {}", uuid)))?,
    )?;

    sqlx::query(
        "UPDATE reviews SET expertise_score = ?, submission_score = ?, comments = ? WHERE uuid = ?",
    )
    .bind(scores.expertise_score)
    .bind(scores.submission_score)
    .bind(scores.comments)
    .bind(uuid.to_string())
    .execute(&mut *tx)
    .await?;

    let aggregate = recompute_scores(&mut tx, submission_uuid).await?;
    tx.commit().await?;

    Ok(aggregate)
}

pub async fn delete_review(pool: &SqlitePool, uuid: Uuid) -> Result<ScoreAggregate> {
    let mut tx = pool.begin().await?;

    let submission_uuid: Option<String> =
        sqlx::query_scalar("SELECT submission_uuid FROM reviews WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;
    let submission_uuid = parse_uuid(
        &submission_uuid.ok_or_else(|| Error::NotFound(format!("Review {}", uuid)))?,
    )?;

    sqlx::query("DELETE FROM reviews WHERE uuid = ?")
        .bind(uuid.to_string())
        .execute(&mut *tx)
        .await?;

    let aggregate = recompute_scores(&mut tx, submission_uuid).await?;
    tx.commit().await?;

    Ok(aggregate)
}

pub async fn find_review(pool: &SqlitePool, uuid: Uuid) -> Result<Option<Review>> {
    let row = sqlx::query(&format!("{} WHERE r.uuid = ?", REVIEW_SELECT))
        .bind(uuid.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_review).transpose()
}

/// The review a user wrote for a submission, if any
pub async fn find_user_review(
    pool: &SqlitePool,
    submission_uuid: Uuid,
    user_guid: Uuid,
) -> Result<Option<Review>> {
    let row = sqlx::query(&format!(
        "{} WHERE r.submission_uuid = ? AND r.user_guid = ?",
        REVIEW_SELECT
    ))
    .bind(submission_uuid.to_string())
    .bind(user_guid.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_review).transpose()
}

pub async fn reviews_for_submission(pool: &SqlitePool, submission_uuid: Uuid) -> Result<Vec<Review>> {
    let rows = sqlx::query(&format!(
        "{} WHERE r.submission_uuid = ? ORDER BY r.submitted_on ASC",
        REVIEW_SELECT
    ))
    .bind(submission_uuid.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_review).collect()
}

pub async fn reviews_by_user(pool: &SqlitePool, user_guid: Uuid) -> Result<Vec<Review>> {
    let rows = sqlx::query(&format!(
        "{} WHERE r.user_guid = ? ORDER BY r.submitted_on DESC",
        REVIEW_SELECT
    ))
    .bind(user_guid.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_review).collect()
}
