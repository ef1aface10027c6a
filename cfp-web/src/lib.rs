//! cfp-web library: conference Call for Papers service
//!
//! Signup and authentication, submission upload, peer review scoring and
//! administrative content management over a SQLite database.

pub mod api;
pub mod auth;
pub mod db;
pub mod deadlines;
pub mod error;
pub mod mailer;
pub mod pagination;
pub mod permissions;
pub mod uploads;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use cfp_common::config::TomlConfig;
use mailer::Mailer;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Bootstrap configuration
    pub config: Arc<TomlConfig>,
    /// HMAC key for activation and password reset tokens
    pub secret_key: Arc<String>,
    /// Directory uploaded files are stored under
    pub uploads_root: Arc<PathBuf>,
    /// Outbound mail seam
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: TomlConfig,
        secret_key: String,
        uploads_root: PathBuf,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            secret_key: Arc::new(secret_key),
            uploads_root: Arc::new(uploads_root),
            mailer,
        }
    }

    /// Edit and review age limits from configuration
    pub fn windows(&self) -> permissions::Windows {
        permissions::Windows {
            edit_days: self.config.submission_edit_window_days,
            review_days: self.config.review_window_days,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_size;

    Router::new()
        .merge(api::health_routes())
        .merge(api::site_routes())
        .merge(api::account_routes())
        .merge(api::profile_routes())
        .merge(api::submission_routes(upload_limit))
        .merge(api::review_routes())
        .merge(api::admin_routes())
        .fallback(api::page_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
