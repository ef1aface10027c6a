//! Submission window and registration gating

use cfp_common::db::{settings, SubmissionWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    NotConfigured,
    NotYetOpen,
    Open,
    Closed,
}

/// Bounds are inclusive
pub fn window_state(window: Option<&SubmissionWindow>, now: DateTime<Utc>) -> WindowState {
    match window {
        None => WindowState::NotConfigured,
        Some(w) if now < w.open_date => WindowState::NotYetOpen,
        Some(w) if now > w.close_date => WindowState::Closed,
        Some(_) => WindowState::Open,
    }
}

/// Superusers bypass the window; an unconfigured window is closed
pub fn can_submit(window: Option<&SubmissionWindow>, now: DateTime<Utc>, is_superuser: bool) -> bool {
    is_superuser || window_state(window, now) == WindowState::Open
}

pub async fn submissions_open_for(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    is_superuser: bool,
) -> cfp_common::Result<bool> {
    let window = settings::get_submission_window(pool).await?;
    Ok(can_submit(window.as_ref(), now, is_superuser))
}

pub async fn registration_open(pool: &SqlitePool) -> cfp_common::Result<bool> {
    Ok(!settings::is_registration_disabled(pool).await?)
}
