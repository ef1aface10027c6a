//! Superuser-only content and site administration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use cfp_common::db::{settings, SubmissionWindow, PROGRAMME_COMMITTEE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::CurrentUser;
use crate::db::content::{self, FrontPage, HelpPageItem};
use crate::db::users;
use crate::validation::HelpItemForm;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub open_date: DateTime<Utc>,
    pub close_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub disabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommitteeRequest {
    pub member: bool,
}

#[derive(Debug, Serialize)]
pub struct CommitteeResponse {
    pub username: String,
    pub is_committee: bool,
}

fn require_admin(current: &CurrentUser) -> ApiResult<()> {
    if current.actor().is_admin() {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied(
            "Administrator access required.".to_string(),
        ))
    }
}

/// PUT /api/admin/front_page
pub async fn update_front_page(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(page): Json<FrontPage>,
) -> ApiResult<Json<FrontPage>> {
    require_admin(&current)?;
    content::update_front_page(&state.db, &page).await?;
    info!(username = %current.user.username, "Front page updated");
    Ok(Json(content::get_front_page(&state.db).await?))
}

/// POST /api/admin/help
pub async fn create_help_item(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<HelpItemForm>,
) -> ApiResult<(StatusCode, Json<HelpPageItem>)> {
    require_admin(&current)?;
    form.validate().into_result()?;

    let item =
        content::create_help_item(&state.db, form.short_description.trim(), &form.content, form.lead)
            .await?;
    info!(id = item.id, "Help item created");
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/admin/help/:id
pub async fn update_help_item(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
    Json(form): Json<HelpItemForm>,
) -> ApiResult<Json<HelpPageItem>> {
    require_admin(&current)?;
    form.validate().into_result()?;

    let item = content::update_help_item(
        &state.db,
        id,
        form.short_description.trim(),
        &form.content,
        form.lead,
    )
    .await?;
    info!(id, "Help item updated");
    Ok(Json(item))
}

/// DELETE /api/admin/help/:id
pub async fn delete_help_item(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    require_admin(&current)?;
    content::delete_help_item(&state.db, id).await?;
    info!(id, "Help item deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/submission_window
pub async fn set_submission_window(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<WindowRequest>,
) -> ApiResult<StatusCode> {
    require_admin(&current)?;
    settings::set_submission_window(
        &state.db,
        &SubmissionWindow {
            open_date: request.open_date,
            close_date: request.close_date,
        },
    )
    .await?;
    info!(open = %request.open_date, close = %request.close_date, "Submission window set");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/admin/submission_window
pub async fn clear_submission_window(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<StatusCode> {
    require_admin(&current)?;
    settings::clear_submission_window(&state.db).await?;
    info!("Submission window cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/registration
pub async fn set_registration(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RegistrationRequest>,
) -> ApiResult<StatusCode> {
    require_admin(&current)?;
    settings::set_registration_disabled(&state.db, request.disabled).await?;
    info!(disabled = request.disabled, "Registration switch changed");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/users/:username/committee
pub async fn set_committee_membership(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(username): Path<String>,
    Json(request): Json<CommitteeRequest>,
) -> ApiResult<Json<CommitteeResponse>> {
    require_admin(&current)?;
    let user = users::find_by_username(&state.db, &username)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {}", username)))?;

    users::set_group_membership(&state.db, user.guid, PROGRAMME_COMMITTEE, request.member).await?;
    info!(username = %user.username, member = request.member, "Committee membership changed");

    Ok(Json(CommitteeResponse {
        username: user.username,
        is_committee: request.member,
    }))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/front_page", put(update_front_page))
        .route("/api/admin/help", post(create_help_item))
        .route(
            "/api/admin/help/:id",
            put(update_help_item).delete(delete_help_item),
        )
        .route(
            "/api/admin/submission_window",
            put(set_submission_window).delete(clear_submission_window),
        )
        .route("/api/admin/registration", put(set_registration))
        .route("/api/admin/users/:username/committee", put(set_committee_membership))
}
