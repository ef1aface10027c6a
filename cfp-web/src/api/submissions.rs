//! Submission endpoints
//!
//! Create and update take `multipart/form-data` with the text fields
//! `title`, `authors`, `contact_email`, `abstract`, `conflicts` and an
//! optional `file` part.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cfp_common::time;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::reviews::{self, Review};
use crate::db::submissions::{
    self, RelatedSubmission, Submission, SubmissionFields, SubmissionListEntry,
};
use crate::pagination::{paginate, Page, PageQuery};
use crate::permissions::{self, Actor};
use crate::uploads;
use crate::validation;
use crate::{deadlines, ApiError, ApiResult, AppState};

/// Multipart headroom above the file size limit for the text fields
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Parsed multipart submission form
#[derive(Debug, Default)]
pub struct SubmissionUpload {
    pub fields: SubmissionFields,
    pub file: Option<(String, Vec<u8>)>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionView {
    pub submission: Submission,
    pub submission_file_name: Option<String>,
    /// Committee members and superusers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<Review>>,
    pub related_submissions: Vec<RelatedSubmission>,
    pub can_edit: bool,
    pub can_review: bool,
    pub has_reviewed: bool,
    pub review_uuid: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionListResponse {
    pub submissions: Vec<SubmissionListEntry>,
    pub pagination: Page,
    pub year: Option<i32>,
}

fn multipart_error(err: axum::extract::multipart::MultipartError, max_size: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(uploads::too_large_message(max_size))
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

async fn read_upload(mut multipart: Multipart, max_size: usize) -> ApiResult<SubmissionUpload> {
    let mut upload = SubmissionUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_size))?;
            // Browsers send an empty part when no file was chosen
            if !bytes.is_empty() || !file_name.is_empty() {
                upload.file = Some((file_name, bytes.to_vec()));
            }
            continue;
        }

        let value = field.text().await.map_err(|e| multipart_error(e, max_size))?;
        match name.as_str() {
            "title" => upload.fields.title = value.trim().to_string(),
            "authors" => upload.fields.authors = value,
            "contact_email" => upload.fields.contact_email = value.trim().to_string(),
            "abstract" => upload.fields.abstract_text = value,
            "conflicts" => upload.fields.conflicts = value,
            other => warn!("Ignoring unknown submission form field '{}'", other),
        }
    }

    Ok(upload)
}

/// Validate the form and write the file, if any
async fn validate_and_store(
    state: &AppState,
    upload: &SubmissionUpload,
) -> ApiResult<Option<submissions::StoredFile>> {
    let mut errors = validation::validate_submission_fields(&upload.fields);

    let checked = match &upload.file {
        Some((name, bytes)) => match uploads::check_upload(bytes, state.config.max_upload_size) {
            Ok(content_type) => Some((name, bytes, content_type)),
            Err(message) => {
                errors.add("file", message);
                None
            }
        },
        None => None,
    };
    errors.into_result()?;

    match checked {
        Some((name, bytes, content_type)) => Ok(Some(
            uploads::store_upload(&state.uploads_root, name, bytes, content_type, time::now())
                .await?,
        )),
        None => Ok(None),
    }
}

/// Remove a freshly written file whose database write failed
async fn discard_stored(state: &AppState, stored: Option<&submissions::StoredFile>) {
    if let Some(file) = stored {
        uploads::remove_stored(&state.uploads_root, &file.relative_path).await;
    }
}

async fn load_submission(state: &AppState, uuid: Uuid) -> ApiResult<Submission> {
    submissions::find_submission(&state.db, uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Submission {}", uuid)))
}

/// POST /api/submissions
pub async fn create_submission(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    let now = time::now();
    if !deadlines::submissions_open_for(&state.db, now, current.user.is_superuser).await? {
        return Err(ApiError::PermissionDenied(
            "The submission window is closed.".to_string(),
        ));
    }

    let upload = read_upload(multipart, state.config.max_upload_size).await?;
    let stored = validate_and_store(&state, &upload).await?;

    let submission = match submissions::insert_submission(
        &state.db,
        current.user.guid,
        &upload.fields,
        stored.as_ref(),
        now,
    )
    .await
    {
        Ok(submission) => submission,
        Err(e) => {
            discard_stored(&state, stored.as_ref()).await;
            return Err(e.into());
        }
    };

    info!(
        submission = %submission.uuid,
        username = %current.user.username,
        file_hash = ?submission.file_hash,
        "Submission created"
    );

    Ok((StatusCode::CREATED, Json(submission)))
}

/// PUT /api/submissions/:uuid
pub async fn update_submission(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<Submission>> {
    let existing = load_submission(&state, uuid).await?;
    if !permissions::can_edit_submission(&current.actor(), &existing, state.windows(), time::now()) {
        return Err(ApiError::PermissionDenied(
            "This submission can no longer be edited by you.".to_string(),
        ));
    }

    let upload = read_upload(multipart, state.config.max_upload_size).await?;
    let stored = validate_and_store(&state, &upload).await?;

    if let Err(e) =
        submissions::update_submission(&state.db, uuid, &upload.fields, stored.as_ref()).await
    {
        discard_stored(&state, stored.as_ref()).await;
        return Err(e.into());
    }

    if stored.is_some() {
        if let Some(old_path) = &existing.file_path {
            uploads::remove_stored(&state.uploads_root, old_path).await;
        }
    }

    info!(submission = %uuid, username = %current.user.username, "Submission updated");

    Ok(Json(load_submission(&state, uuid).await?))
}

/// GET /api/submissions/:uuid
pub async fn view_submission(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Json<SubmissionView>> {
    let submission = load_submission(&state, uuid).await?;
    let actor = current.actor();
    if !permissions::can_view_submission(&actor, &submission) {
        return Err(ApiError::PermissionDenied(
            "You may not view this submission.".to_string(),
        ));
    }

    let now = time::now();
    let windows = state.windows();
    let own_review = reviews::find_user_review(&state.db, uuid, actor.user_guid).await?;
    let has_reviewed = own_review.is_some();

    let reviews = if can_see_reviews(&actor) {
        Some(reviews::reviews_for_submission(&state.db, uuid).await?)
    } else {
        None
    };
    let related_submissions = submissions::related_submissions(&state.db, &submission).await?;

    Ok(Json(SubmissionView {
        submission_file_name: submission.file_name.clone(),
        reviews,
        related_submissions,
        can_edit: permissions::can_edit_submission(&actor, &submission, windows, now),
        can_review: permissions::can_create_review(&actor, &submission, has_reviewed, windows, now),
        has_reviewed,
        review_uuid: own_review.map(|r| r.uuid),
        submission,
    }))
}

fn can_see_reviews(actor: &Actor) -> bool {
    actor.is_superuser || actor.is_committee
}

/// GET /api/submissions?page=N&year=YYYY
pub async fn list_submissions(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<SubmissionListResponse>> {
    if !permissions::can_list_submissions(&current.actor()) {
        return Err(ApiError::PermissionDenied(
            "Only the programme committee may list submissions.".to_string(),
        ));
    }

    let total = submissions::count_submissions(&state.db, query.year).await?;
    let page = paginate(total, query.page);
    let rows = submissions::list_page(
        &state.db,
        current.user.guid,
        query.year,
        page.page_size,
        page.offset,
    )
    .await?;

    Ok(Json(SubmissionListResponse {
        submissions: rows,
        pagination: page,
        year: query.year,
    }))
}

/// GET /api/submissions/:uuid/file
///
/// Served inline with the content type detected at upload.
pub async fn download_file(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
) -> ApiResult<Response> {
    let submission = load_submission(&state, uuid).await?;
    if !permissions::can_view_submission(&current.actor(), &submission) {
        return Err(ApiError::PermissionDenied(
            "You may not download this file.".to_string(),
        ));
    }

    let path = submission
        .file_path
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("This submission has no file".to_string()))?;
    let bytes = uploads::read_stored(&state.uploads_root, path).await?;

    let content_type = submission
        .file_content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!(
        "inline; filename=\"{}\"",
        submission.file_name.as_deref().unwrap_or("upload")
    );

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /api/submissions/:uuid
pub async fn delete_submission(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(uuid): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !current.actor().is_admin() {
        return Err(ApiError::PermissionDenied(
            "Only administrators may delete submissions.".to_string(),
        ));
    }

    let file_path = submissions::delete_submission(&state.db, uuid).await?;
    if let Some(path) = file_path {
        uploads::remove_stored(&state.uploads_root, &path).await;
    }

    info!(submission = %uuid, username = %current.user.username, "Submission deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn submission_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/api/submissions", get(list_submissions).post(create_submission))
        .route(
            "/api/submissions/:uuid",
            get(view_submission)
                .put(update_submission)
                .delete(delete_submission),
        )
        .route("/api/submissions/:uuid/file", get(download_file))
        .layer(DefaultBodyLimit::max(max_upload_size + FORM_OVERHEAD))
}
