//! Review endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use cfp_common::time;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::reviews::{self, Review, ReviewScores, ScoreAggregate};
use crate::db::submissions;
use crate::permissions;
use crate::validation::ReviewForm;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: Review,
    /// Submission scores after the change
    pub scores: ScoreAggregate,
}

fn scores(form: &ReviewForm) -> ReviewScores<'_> {
    ReviewScores {
        expertise_score: form.expertise_score.unwrap_or_default(),
        submission_score: form.submission_score.unwrap_or_default(),
        comments: &form.comments,
    }
}

async fn load_review(state: &AppState, uuid: Uuid) -> ApiResult<Review> {
    reviews::find_review(&state.db, uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Review {}", uuid)))
}

/// POST /api/submissions/:uuid/reviews
pub async fn create_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(submission_uuid): Path<Uuid>,
    Json(form): Json<ReviewForm>,
) -> ApiResult<(StatusCode, Json<ReviewResponse>)> {
    let submission = submissions::find_submission(&state.db, submission_uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {}", submission_uuid)))?;

    let actor = current.actor();
    let has_reviewed = reviews::find_user_review(&state.db, submission_uuid, actor.user_guid)
        .await?
        .is_some();
    if !permissions::can_create_review(&actor, &submission, has_reviewed, state.windows(), time::now()) {
        return Err(ApiError::PermissionDenied(
            "You may not review this submission.".to_string(),
        ));
    }

    form.validate().into_result()?;

    let (uuid, aggregate) =
        reviews::create_review(&state.db, submission_uuid, actor.user_guid, scores(&form)).await?;

    info!(
        review = %uuid,
        submission = %submission_uuid,
        username = %current.user.username,
        average_score = ?aggregate.average_score,
        "Review created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ReviewResponse {
            review: load_review(&state, uuid).await?,
            scores: aggregate,
        }),
    ))
}

/// GET /api/reviews/:uuid
pub async fn get_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<Review>> {
    let review = load_review(&state, uuid).await?;
    let actor = current.actor();
    if !(actor.is_superuser || actor.is_committee) {
        return Err(ApiError::PermissionDenied("You may not view this review.".to_string()));
    }
    Ok(Json(review))
}

/// PUT /api/reviews/:uuid
pub async fn update_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
    Json(form): Json<ReviewForm>,
) -> ApiResult<Json<ReviewResponse>> {
    let review = load_review(&state, uuid).await?;
    if !permissions::can_modify_review(&current.actor(), &review, state.windows(), time::now()) {
        return Err(ApiError::PermissionDenied("You may not edit this review.".to_string()));
    }

    form.validate().into_result()?;

    let aggregate = reviews::update_review(&state.db, uuid, scores(&form)).await?;
    info!(review = %uuid, username = %current.user.username, "Review updated");

    Ok(Json(ReviewResponse {
        review: load_review(&state, uuid).await?,
        scores: aggregate,
    }))
}

/// DELETE /api/reviews/:uuid
pub async fn delete_review(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<ScoreAggregate>> {
    let review = load_review(&state, uuid).await?;
    if !permissions::can_modify_review(&current.actor(), &review, state.windows(), time::now()) {
        return Err(ApiError::PermissionDenied("You may not delete this review.".to_string()));
    }

    let aggregate = reviews::delete_review(&state.db, uuid).await?;
    info!(
        review = %uuid,
        submission = %review.submission_uuid,
        username = %current.user.username,
        "Review deleted"
    );

    Ok(Json(aggregate))
}

pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/api/submissions/:uuid/reviews", post(create_review))
        .route(
            "/api/reviews/:uuid",
            get(get_review).put(update_review).delete(delete_review),
        )
}
