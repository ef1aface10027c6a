//! HTTP API handlers for cfp-web

pub mod accounts;
pub mod admin;
pub mod health;
pub mod profile;
pub mod reviews;
pub mod site;
pub mod submissions;

pub use accounts::{account_routes, create_superuser};
pub use admin::admin_routes;
pub use health::health_routes;
pub use profile::profile_routes;
pub use reviews::review_routes;
pub use site::site_routes;
pub use submissions::submission_routes;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Router fallback
pub async fn page_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "code": "PAGE_NOT_FOUND",
                "message": "Page not found",
            }
        })),
    )
}
