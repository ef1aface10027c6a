//! Account endpoints: signup, activation, login, logout and passwords

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cfp_common::{config::TomlConfig, time};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::auth::{
    decode_uid, encode_uid, password, session, CurrentUser, ACCOUNT_ACTIVATION, PASSWORD_RESET,
};
use crate::db::{sessions, users};
use crate::db::users::{NewUser, User};
use crate::error::ValidationErrors;
use crate::mailer;
use crate::validation::{
    self, LoginForm, PasswordChangeForm, PasswordResetForm, SetPasswordForm, SignupForm,
};
use crate::{deadlines, ApiError, ApiResult, AppState};

pub const EMAIL_IN_USE: &str = "Email address has already been used.";
pub const USERNAME_EXISTS: &str = "Username already exists.";
pub const USERNAME_RESERVED: &str =
    "This username is restricted or otherwise unavailable. Please pick another.";
pub const INVALID_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields are case-sensitive.";
pub const INACTIVE_ACCOUNT: &str = "This account is inactive. Please check your inbox for an activation email. \
     If you do not have any such email or this issue persists, please contact the organisers.";
pub const ACTIVATION_INVALID: &str = "The activation link is invalid or has expired.";
pub const RESET_INVALID: &str =
    "The password reset link was invalid, possibly because it has already been used.";
pub const OLD_PASSWORD_INCORRECT: &str =
    "Your old password was entered incorrectly. Please enter it again.";

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub username: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub token: String,
    pub expires_in_seconds: i64,
}

/// Attributes a new password must not resemble
async fn password_attributes(pool: &SqlitePool, user: &User) -> ApiResult<[(String, String); 3]> {
    let profile = users::get_profile(pool, user.guid).await?;
    Ok([
        ("username".to_string(), user.username.clone()),
        ("email address".to_string(), user.email.clone()),
        ("name".to_string(), profile.name),
    ])
}

fn as_pairs(attributes: &[(String, String); 3]) -> [(&str, &str); 3] {
    [
        (attributes[0].0.as_str(), attributes[0].1.as_str()),
        (attributes[1].0.as_str(), attributes[1].1.as_str()),
        (attributes[2].0.as_str(), attributes[2].1.as_str()),
    ]
}

/// Open a session for `user` and answer with the token and cookie
async fn log_in(state: &AppState, user: &User) -> ApiResult<Response> {
    let now = time::now();
    let ttl_hours = state.config.session_ttl_hours;
    let token = session::start_session(&state.db, user.guid, now, ttl_hours).await?;
    users::touch_last_login(&state.db, user.guid, now).await?;

    info!(username = %user.username, "User logged in");

    let cookie = session::session_cookie(&token, ttl_hours);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            username: user.username.clone(),
            token,
            expires_in_seconds: ttl_hours * 60 * 60,
        }),
    )
        .into_response())
}

/// POST /api/accounts/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    if !deadlines::registration_open(&state.db).await? {
        return Err(ApiError::PermissionDenied(
            "Registration is currently disabled.".to_string(),
        ));
    }

    let form = form.trimmed();
    form.validate(state.config.min_password_length).into_result()?;

    // Only the first failing account check is reported
    if users::email_in_use(&state.db, &form.email, None).await? {
        return Err(ApiError::Validation(ValidationErrors::non_field(EMAIL_IN_USE)));
    }
    if users::username_exists(&state.db, &form.username).await? {
        return Err(ApiError::Validation(ValidationErrors::non_field(USERNAME_EXISTS)));
    }
    if validation::is_reserved_username(&form.username) {
        return Err(ApiError::Validation(ValidationErrors::non_field(USERNAME_RESERVED)));
    }

    let password_hash =
        password::hash_password_blocking(form.password1.clone(), state.config.password_hash_cost)
            .await?;

    let user = users::create_user(
        &state.db,
        &NewUser {
            username: form.username.clone(),
            email: form.email.clone(),
            password_hash,
            name: form.name.clone(),
            country: form.country.clone(),
            affiliation: form.affiliation.clone(),
            is_active: false,
            is_superuser: false,
            email_confirmed: false,
        },
    )
    .await?;

    let token = ACCOUNT_ACTIVATION
        .make_token(&state.secret_key, &user, false, time::now())
        .ok_or_else(|| ApiError::Internal("Could not create activation token".to_string()))?;
    let mail = mailer::activation_mail(
        &state.config.application_name,
        &state.config.public_url,
        &user.email,
        &user.username,
        &encode_uid(user.guid),
        &token,
    );
    if let Err(e) = state.mailer.send(mail) {
        error!(username = %user.username, "Failed to send activation mail: {}", e);
        return Err(ApiError::Internal("Failed to send activation mail".to_string()));
    }

    info!(username = %user.username, "New account registered, awaiting activation");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            username: user.username,
            message: "Please check your inbox for an activation email.".to_string(),
        }),
    ))
}

/// GET /api/accounts/activate/:uid/:token
pub async fn activate(
    State(state): State<AppState>,
    Path((uid, token)): Path<(String, String)>,
) -> ApiResult<Response> {
    let invalid = || ApiError::BadRequest(ACTIVATION_INVALID.to_string());

    let guid = decode_uid(&uid).ok_or_else(invalid)?;
    let user = users::find_by_guid(&state.db, guid).await?.ok_or_else(invalid)?;
    let profile = users::get_profile(&state.db, guid).await?;

    let valid = ACCOUNT_ACTIVATION.check_token(
        &state.secret_key,
        &user,
        profile.email_confirmed,
        &token,
        time::now(),
        state.config.activation_timeout_days,
    );
    if !valid {
        warn!(username = %user.username, "Rejected activation token");
        return Err(invalid());
    }

    users::activate(&state.db, guid).await?;
    info!(username = %user.username, "Account activated");

    log_in(&state, &user).await
}

/// POST /api/accounts/login
pub async fn login(State(state): State<AppState>, Json(form): Json<LoginForm>) -> ApiResult<Response> {
    form.validate().into_result()?;

    let invalid = || ApiError::Validation(ValidationErrors::non_field(INVALID_LOGIN));

    let Some(user) = users::find_by_username(&state.db, &form.username).await? else {
        // Spend the same time as a real check
        let _ = password::hash_password_blocking(form.password, state.config.password_hash_cost).await;
        info!(username = %form.username, "Login failed: unknown user");
        return Err(invalid());
    };

    if !password::verify_password_blocking(form.password, user.password_hash.clone()).await? {
        info!(username = %user.username, "Login failed: wrong password");
        return Err(invalid());
    }

    // Only reveal the inactive state to someone who knows the password
    if !user.is_active {
        return Err(ApiError::Validation(ValidationErrors::non_field(INACTIVE_ACCOUNT)));
    }

    log_in(&state, &user).await
}

/// POST /api/accounts/logout
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> ApiResult<Response> {
    session::end_session(&state.db, &current.session.0).await?;
    info!(username = %current.user.username, "User logged out");

    Ok((
        [(header::SET_COOKIE, session::clear_session_cookie())],
        MessageResponse::new("Logged out."),
    )
        .into_response())
}

/// POST /api/accounts/password_change
pub async fn password_change(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(form): Json<PasswordChangeForm>,
) -> ApiResult<Json<MessageResponse>> {
    let attributes = password_attributes(&state.db, &current.user).await?;
    let mut errors = form.validate(state.config.min_password_length, &as_pairs(&attributes));

    if !form.old_password.is_empty()
        && !password::verify_password_blocking(
            form.old_password.clone(),
            current.user.password_hash.clone(),
        )
        .await?
    {
        errors.add("old_password", OLD_PASSWORD_INCORRECT);
    }
    errors.into_result()?;

    let hash =
        password::hash_password_blocking(form.new_password1, state.config.password_hash_cost)
            .await?;
    users::set_password_hash(&state.db, current.user.guid, &hash).await?;

    let dropped = sessions::delete_user_sessions(
        &state.db,
        current.user.guid,
        Some(&session::hash_token(&current.session.0)),
    )
    .await?;
    info!(username = %current.user.username, other_sessions = dropped, "Password changed");

    Ok(MessageResponse::new("Your password has been changed."))
}

/// POST /api/accounts/password_reset
///
/// Answers the same way whether or not the address is known.
pub async fn password_reset(
    State(state): State<AppState>,
    Json(form): Json<PasswordResetForm>,
) -> ApiResult<Json<MessageResponse>> {
    let mut errors = ValidationErrors::new();
    if form.email.trim().is_empty() {
        errors.add("email", validation::REQUIRED);
    } else if !validation::is_valid_email(form.email.trim()) {
        errors.add("email", validation::INVALID_EMAIL);
    }
    errors.into_result()?;

    let now = time::now();
    for user in users::find_active_by_email(&state.db, form.email.trim()).await? {
        let profile = users::get_profile(&state.db, user.guid).await?;
        let Some(token) =
            PASSWORD_RESET.make_token(&state.secret_key, &user, profile.email_confirmed, now)
        else {
            error!(username = %user.username, "Could not create password reset token");
            continue;
        };
        let mail = mailer::password_reset_mail(
            &state.config.application_name,
            &state.config.public_url,
            &user.email,
            &user.username,
            &encode_uid(user.guid),
            &token,
        );
        if let Err(e) = state.mailer.send(mail) {
            error!(username = %user.username, "Failed to send password reset mail: {}", e);
        } else {
            info!(username = %user.username, "Password reset requested");
        }
    }

    Ok(MessageResponse::new(
        "If an account exists for that address, a password reset email has been sent.",
    ))
}

/// POST /api/accounts/password_reset/confirm
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(form): Json<SetPasswordForm>,
) -> ApiResult<Json<MessageResponse>> {
    let invalid = || ApiError::BadRequest(RESET_INVALID.to_string());

    let guid = decode_uid(&form.uid).ok_or_else(invalid)?;
    let user = users::find_by_guid(&state.db, guid).await?.ok_or_else(invalid)?;
    let profile = users::get_profile(&state.db, guid).await?;

    if !PASSWORD_RESET.check_token(
        &state.secret_key,
        &user,
        profile.email_confirmed,
        &form.token,
        time::now(),
        state.config.activation_timeout_days,
    ) {
        warn!(username = %user.username, "Rejected password reset token");
        return Err(invalid());
    }

    let attributes = password_attributes(&state.db, &user).await?;
    form.validate(state.config.min_password_length, &as_pairs(&attributes))
        .into_result()?;

    let hash =
        password::hash_password_blocking(form.new_password1, state.config.password_hash_cost)
            .await?;
    users::set_password_hash(&state.db, guid, &hash).await?;
    sessions::delete_user_sessions(&state.db, guid, None).await?;

    info!(username = %user.username, "Password reset completed");

    Ok(MessageResponse::new("Your password has been set. You may now log in."))
}

/// Create an active superuser with a confirmed email address
///
/// Used by the `create-superuser` command; applies the signup field and
/// password rules.
pub async fn create_superuser(
    pool: &SqlitePool,
    config: &TomlConfig,
    username: &str,
    email: &str,
    password: &str,
) -> ApiResult<User> {
    let mut errors = ValidationErrors::new();
    if !validation::is_valid_username(username) {
        errors.add("username", validation::INVALID_USERNAME);
    }
    if !validation::is_valid_email(email) {
        errors.add("email", validation::INVALID_EMAIL);
    }
    for message in validation::validate_password(
        password,
        config.min_password_length,
        &[("username", username), ("email address", email)],
    ) {
        errors.add("password", message);
    }
    errors.into_result()?;

    if users::username_exists(pool, username).await? {
        return Err(ApiError::Validation(ValidationErrors::non_field(USERNAME_EXISTS)));
    }

    let password_hash =
        password::hash_password_blocking(password.to_string(), config.password_hash_cost).await?;

    let user = users::create_user(
        pool,
        &NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            name: username.to_string(),
            country: String::new(),
            affiliation: String::new(),
            is_active: true,
            is_superuser: true,
            email_confirmed: true,
        },
    )
    .await?;

    info!(username = %user.username, "Superuser created");
    Ok(user)
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts/signup", post(signup))
        .route("/api/accounts/activate/:uid/:token", get(activate))
        .route("/api/accounts/login", post(login))
        .route("/api/accounts/logout", post(logout))
        .route("/api/accounts/password_change", post(password_change))
        .route("/api/accounts/password_reset", post(password_reset))
        .route("/api/accounts/password_reset/confirm", post(password_reset_confirm))
}
