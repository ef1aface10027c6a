//! The logged-in user's own profile

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::api::accounts::EMAIL_IN_USE;
use crate::auth::CurrentUser;
use crate::db::reviews::{self, Review};
use crate::db::submissions::{self, Submission};
use crate::db::users::{self, Profile};
use crate::validation::ProfileForm;
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub is_superuser: bool,
    pub is_committee: bool,
    pub profile: Profile,
    pub submissions: Vec<Submission>,
    /// Present for committee members only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<Review>>,
}

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<Json<ProfileResponse>> {
    let guid = current.user.guid;
    let profile = users::get_profile(&state.db, guid).await?;
    let submissions = submissions::list_for_user(&state.db, guid).await?;
    let reviews = if current.is_committee {
        Some(reviews::reviews_by_user(&state.db, guid).await?)
    } else {
        None
    };

    Ok(Json(ProfileResponse {
        username: current.user.username,
        email: current.user.email,
        is_superuser: current.user.is_superuser,
        is_committee: current.is_committee,
        profile,
        submissions,
        reviews,
    }))
}

/// PUT /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<ProfileForm>,
) -> ApiResult<Json<Profile>> {
    let form = form.trimmed();
    let mut errors = form.validate();
    if !errors.has_field("email")
        && users::email_in_use(&state.db, &form.email, Some(current.user.guid)).await?
    {
        errors.add("email", EMAIL_IN_USE);
    }
    errors.into_result()?;

    users::update_profile(
        &state.db,
        current.user.guid,
        &form.name,
        &form.country,
        &form.affiliation,
        &form.email,
    )
    .await?;

    info!(username = %current.user.username, "Profile updated");

    Ok(Json(users::get_profile(&state.db, current.user.guid).await?))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/api/profile", get(get_profile).put(update_profile))
}
