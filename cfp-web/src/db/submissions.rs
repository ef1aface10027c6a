//! Submission persistence

use super::users::parse_uuid;
use cfp_common::{time, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub uuid: Uuid,
    pub user_guid: Uuid,
    pub submitted_on: DateTime<Utc>,
    pub title: String,
    pub authors: String,
    pub contact_email: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub conflicts: String,
    /// Path relative to the uploads root
    #[serde(skip)]
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_content_type: Option<String>,
    pub file_size: Option<i64>,
    pub file_hash: Option<String>,
    pub review_count: i64,
    pub total_score: i64,
    pub average_score: Option<f64>,
}

/// Editable text fields of a submission
#[derive(Debug, Clone, Default)]
pub struct SubmissionFields {
    pub title: String,
    pub authors: String,
    pub contact_email: String,
    pub abstract_text: String,
    pub conflicts: String,
}

/// Metadata of a file written to the uploads directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub relative_path: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub sha256: String,
}

/// Another submission by the same author
#[derive(Debug, Clone, Serialize)]
pub struct RelatedSubmission {
    pub uuid: Uuid,
    pub title: String,
    pub submitted_on: DateTime<Utc>,
}

/// One row of the committee listing
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionListEntry {
    pub uuid: Uuid,
    pub author_name: String,
    pub author_country: String,
    pub title: String,
    pub review_count: i64,
    pub average_score: Option<f64>,
    pub submitted_on: DateTime<Utc>,
    pub reviewed_by_me: bool,
}

const SUBMISSION_COLUMNS: &str = "uuid, user_guid, submitted_on, title, authors, contact_email, \
     abstract, conflicts, file_path, file_name, file_content_type, file_size, file_hash, \
     review_count, total_score, average_score";

fn row_to_submission(row: &SqliteRow) -> Result<Submission> {
    let uuid: String = row.try_get("uuid")?;
    let user_guid: String = row.try_get("user_guid")?;
    let submitted_on: String = row.try_get("submitted_on")?;

    Ok(Submission {
        uuid: parse_uuid(&uuid)?,
        user_guid: parse_uuid(&user_guid)?,
        submitted_on: time::from_db(&submitted_on)?,
        title: row.try_get("title")?,
        authors: row.try_get("authors")?,
        contact_email: row.try_get("contact_email")?,
        abstract_text: row.try_get("abstract")?,
        conflicts: row.try_get("conflicts")?,
        file_path: row.try_get("file_path")?,
        file_name: row.try_get("file_name")?,
        file_content_type: row.try_get("file_content_type")?,
        file_size: row.try_get("file_size")?,
        file_hash: row.try_get("file_hash")?,
        review_count: row.try_get("review_count")?,
        total_score: row.try_get("total_score")?,
        average_score: row.try_get("average_score")?,
    })
}

pub async fn insert_submission(
    pool: &SqlitePool,
    user_guid: Uuid,
    fields: &SubmissionFields,
    file: Option<&StoredFile>,
    submitted_on: DateTime<Utc>,
) -> Result<Submission> {
    let uuid = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO submissions (
            uuid, user_guid, submitted_on, title, authors, contact_email, abstract, conflicts,
            file_path, file_name, file_content_type, file_size, file_hash
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid.to_string())
    .bind(user_guid.to_string())
    .bind(time::to_db(&submitted_on))
    .bind(&fields.title)
    .bind(&fields.authors)
    .bind(&fields.contact_email)
    .bind(&fields.abstract_text)
    .bind(&fields.conflicts)
    .bind(file.map(|f| f.relative_path.clone()))
    .bind(file.map(|f| f.file_name.clone()))
    .bind(file.map(|f| f.content_type.clone()))
    .bind(file.map(|f| f.size))
    .bind(file.map(|f| f.sha256.clone()))
    .execute(pool)
    .await?;

    find_submission(pool, uuid)
        .await?
        .ok_or_else(|| cfp_common::Error::Internal(format!("Submission {} vanished after insert", uuid)))
}

/// Update text fields, replacing the file columns when a new file is given
pub async fn update_submission(
    pool: &SqlitePool,
    uuid: Uuid,
    fields: &SubmissionFields,
    file: Option<&StoredFile>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE submissions
        SET title = ?, authors = ?, contact_email = ?, abstract = ?, conflicts = ?
        WHERE uuid = ?
        "#,
    )
    .bind(&fields.title)
    .bind(&fields.authors)
    .bind(&fields.contact_email)
    .bind(&fields.abstract_text)
    .bind(&fields.conflicts)
    .bind(uuid.to_string())
    .execute(&mut *tx)
    .await?;

    if let Some(file) = file {
        sqlx::query(
            r#"
            UPDATE submissions
            SET file_path = ?, file_name = ?, file_content_type = ?, file_size = ?, file_hash = ?
            WHERE uuid = ?
            "#,
        )
        .bind(&file.relative_path)
        .bind(&file.file_name)
        .bind(&file.content_type)
        .bind(file.size)
        .bind(&file.sha256)
        .bind(uuid.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn find_submission(pool: &SqlitePool, uuid: Uuid) -> Result<Option<Submission>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM submissions WHERE uuid = ?",
        SUBMISSION_COLUMNS
    ))
    .bind(uuid.to_string())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(row_to_submission).transpose()
}

/// Submissions owned by a user, newest first
pub async fn list_for_user(pool: &SqlitePool, user_guid: Uuid) -> Result<Vec<Submission>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM submissions WHERE user_guid = ? ORDER BY submitted_on DESC",
        SUBMISSION_COLUMNS
    ))
    .bind(user_guid.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_submission).collect()
}

/// Other submissions by the author of `submission`
pub async fn related_submissions(
    pool: &SqlitePool,
    submission: &Submission,
) -> Result<Vec<RelatedSubmission>> {
    let rows = sqlx::query(
        r#"
        SELECT uuid, title, submitted_on FROM submissions
        WHERE user_guid = ? AND uuid != ?
        ORDER BY submitted_on DESC
        "#,
    )
    .bind(submission.user_guid.to_string())
    .bind(submission.uuid.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let uuid: String = row.try_get("uuid")?;
            let submitted_on: String = row.try_get("submitted_on")?;
            Ok(RelatedSubmission {
                uuid: parse_uuid(&uuid)?,
                title: row.try_get("title")?,
                submitted_on: time::from_db(&submitted_on)?,
            })
        })
        .collect()
}

pub async fn count_submissions(pool: &SqlitePool, year: Option<i32>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM submissions WHERE (? IS NULL OR substr(submitted_on, 1, 4) = ?)",
    )
    .bind(year.map(|y| format!("{:04}", y)))
    .bind(year.map(|y| format!("{:04}", y)))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Page of the committee listing, oldest first
pub async fn list_page(
    pool: &SqlitePool,
    viewer: Uuid,
    year: Option<i32>,
    limit: i64,
    offset: i64,
) -> Result<Vec<SubmissionListEntry>> {
    let year_text = year.map(|y| format!("{:04}", y));

    let rows = sqlx::query(
        r#"
        SELECT s.uuid, s.title, s.review_count, s.average_score, s.submitted_on,
               COALESCE(p.name, '') AS author_name,
               COALESCE(p.country, '') AS author_country,
               EXISTS(
                   SELECT 1 FROM reviews r
                   WHERE r.submission_uuid = s.uuid AND r.user_guid = ?
               ) AS reviewed_by_me
        FROM submissions s
        LEFT JOIN profiles p ON p.user_guid = s.user_guid
        WHERE (? IS NULL OR substr(s.submitted_on, 1, 4) = ?)
        ORDER BY s.submitted_on ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(viewer.to_string())
    .bind(&year_text)
    .bind(&year_text)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let uuid: String = row.try_get("uuid")?;
            let submitted_on: String = row.try_get("submitted_on")?;
            Ok(SubmissionListEntry {
                uuid: parse_uuid(&uuid)?,
                author_name: row.try_get("author_name")?,
                author_country: row.try_get("author_country")?,
                title: row.try_get("title")?,
                review_count: row.try_get("review_count")?,
                average_score: row.try_get("average_score")?,
                submitted_on: time::from_db(&submitted_on)?,
                reviewed_by_me: row.try_get("reviewed_by_me")?,
            })
        })
        .collect()
}

/// Delete a submission and its reviews; returns the stored file path
pub async fn delete_submission(pool: &SqlitePool, uuid: Uuid) -> Result<Option<String>> {
    let mut tx = pool.begin().await?;

    let file_path: Option<Option<String>> =
        sqlx::query_scalar("SELECT file_path FROM submissions WHERE uuid = ?")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;

    let Some(file_path) = file_path else {
        return Err(cfp_common::Error::NotFound(format!("Submission {}", uuid)));
    };

    sqlx::query("DELETE FROM reviews WHERE submission_uuid = ?")
        .bind(uuid.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM submissions WHERE uuid = ?")
        .bind(uuid.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(file_path)
}
