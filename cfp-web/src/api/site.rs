//! Public site information and the help page

use axum::{extract::State, routing::get, Json, Router};
use cfp_common::{db::settings, time};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{CurrentUser, MaybeUser};
use crate::db::content::{self, FrontPage, HelpPageItem};
use crate::deadlines::{self, WindowState};
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct WindowInfo {
    pub state: WindowState,
    pub open_date: Option<DateTime<Utc>>,
    pub close_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub username: String,
    pub is_superuser: bool,
    pub is_committee: bool,
}

#[derive(Debug, Serialize)]
pub struct SiteInfo {
    pub application_name: String,
    pub version: String,
    pub conference_year: i32,
    pub front_page: FrontPage,
    pub submission_window: WindowInfo,
    pub registration_open: bool,
    pub user: Option<SessionUser>,
}

/// GET /api/site
pub async fn get_site_info(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
) -> ApiResult<Json<SiteInfo>> {
    let window = settings::get_submission_window(&state.db).await?;
    let front_page = content::get_front_page(&state.db).await?;
    let registration_open = deadlines::registration_open(&state.db).await?;

    Ok(Json(SiteInfo {
        application_name: state.config.application_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        conference_year: state.config.conference_year,
        front_page,
        submission_window: WindowInfo {
            state: deadlines::window_state(window.as_ref(), time::now()),
            open_date: window.map(|w| w.open_date),
            close_date: window.map(|w| w.close_date),
        },
        registration_open,
        user: current.map(|c| SessionUser {
            username: c.user.username,
            is_superuser: c.user.is_superuser,
            is_committee: c.is_committee,
        }),
    }))
}

/// GET /api/help
pub async fn get_help(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<HelpPageItem>>> {
    Ok(Json(content::list_help_items(&state.db).await?))
}

pub fn site_routes() -> Router<AppState> {
    Router::new()
        .route("/api/site", get(get_site_info))
        .route("/api/help", get(get_help))
}
