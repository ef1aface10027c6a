//! Front page and help page content

use cfp_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrontPage {
    pub lead_paragraph: String,
    pub submission_guidance: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HelpPageItem {
    pub id: i64,
    pub short_description: String,
    pub content: String,
    pub lead: bool,
}

pub async fn get_front_page(pool: &SqlitePool) -> Result<FrontPage> {
    let row = sqlx::query("SELECT lead_paragraph, submission_guidance FROM front_page WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(FrontPage {
            lead_paragraph: row.try_get("lead_paragraph")?,
            submission_guidance: row.try_get("submission_guidance")?,
        }),
        None => Ok(FrontPage::default()),
    }
}

/// Edit the singleton row; it is never inserted or deleted here
pub async fn update_front_page(pool: &SqlitePool, page: &FrontPage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO front_page (id, lead_paragraph, submission_guidance) VALUES (1, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            lead_paragraph = excluded.lead_paragraph,
            submission_guidance = excluded.submission_guidance
        "#,
    )
    .bind(&page.lead_paragraph)
    .bind(&page.submission_guidance)
    .execute(pool)
    .await?;
    Ok(())
}

/// Help items, lead items first
pub async fn list_help_items(pool: &SqlitePool) -> Result<Vec<HelpPageItem>> {
    let rows = sqlx::query(
        "SELECT id, short_description, content, lead FROM help_page_items ORDER BY lead DESC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(HelpPageItem {
                id: row.try_get("id")?,
                short_description: row.try_get("short_description")?,
                content: row.try_get("content")?,
                lead: row.try_get("lead")?,
            })
        })
        .collect()
}

pub async fn create_help_item(
    pool: &SqlitePool,
    short_description: &str,
    content: &str,
    lead: bool,
) -> Result<HelpPageItem> {
    let result = sqlx::query(
        "INSERT INTO help_page_items (short_description, content, lead) VALUES (?, ?, ?)",
    )
    .bind(short_description)
    .bind(content)
    .bind(lead)
    .execute(pool)
    .await?;

    Ok(HelpPageItem {
        id: result.last_insert_rowid(),
        short_description: short_description.to_string(),
        content: content.to_string(),
        lead,
    })
}

pub async fn update_help_item(
    pool: &SqlitePool,
    id: i64,
    short_description: &str,
    content: &str,
    lead: bool,
) -> Result<HelpPageItem> {
    let result = sqlx::query(
        "UPDATE help_page_items SET short_description = ?, content = ?, lead = ? WHERE id = ?",
    )
    .bind(short_description)
    .bind(content)
    .bind(lead)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Help item {}", id)));
    }

    Ok(HelpPageItem {
        id,
        short_description: short_description.to_string(),
        content: content.to_string(),
        lead,
    })
}

pub async fn delete_help_item(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM help_page_items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Help item {}", id)));
    }
    Ok(())
}
