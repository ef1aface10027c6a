//! Site content, administration and service endpoints

mod helpers;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use helpers::*;
use serde_json::json;

#[tokio::test]
async fn test_health_and_buildinfo() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "cfp-web");

    let (status, body) = app.get("/api/buildinfo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/no/such/page", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "PAGE_NOT_FOUND");
}

#[tokio::test]
async fn test_site_info_reflects_session_and_front_page() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token("root-user", Role::Superuser).await;

    let (status, site) = app.get("/api/site", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(site["application_name"], "TestConf");
    assert!(site["user"].is_null());
    assert_eq!(site["front_page"]["lead_paragraph"], "");

    let (status, page) = app
        .put(
            "/api/admin/front_page",
            Some(&admin),
            json!({
                "lead_paragraph": "Welcome to TestConf.",
                "submission_guidance": "PDF please."
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["lead_paragraph"], "Welcome to TestConf.");

    let (_, site) = app.get("/api/site", Some(&admin)).await;
    assert_eq!(site["front_page"]["submission_guidance"], "PDF please.");
    assert_eq!(site["user"]["username"], "root-user");
    assert_eq!(site["user"]["is_superuser"], true);
}

#[tokio::test]
async fn test_admin_endpoints_reject_non_superusers() {
    let app = TestApp::new().await;
    let (_, committee) = app.user_with_token("carl", Role::Committee).await;

    let (status, body) = app
        .put(
            "/api/admin/front_page",
            Some(&committee),
            json!({ "lead_paragraph": "Hacked" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Administrator access required.");

    let (status, _) = app
        .put("/api/admin/registration", Some(&committee), json!({ "disabled": true }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put("/api/admin/registration", None, json!({ "disabled": true }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_help_items_crud() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token("root-user", Role::Superuser).await;
    let (_, author) = app.user_with_token("alice", Role::Author).await;

    let (status, _) = app.get("/api/help", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, formatting) = app
        .post(
            "/api/admin/help",
            Some(&admin),
            json!({ "short_description": "Formatting", "content": "Use A4.", "lead": false }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, overview) = app
        .post(
            "/api/admin/help",
            Some(&admin),
            json!({ "short_description": "Overview", "content": "Start here.", "lead": true }),
        )
        .await;

    let (status, items) = app.get("/api/help", Some(&author)).await;
    assert_eq!(status, StatusCode::OK);
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["short_description"], "Overview");

    let (status, body) = app
        .post(
            "/api/admin/help",
            Some(&admin),
            json!({ "short_description": "x".repeat(33), "content": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["short_description"].is_array());

    let uri = format!("/api/admin/help/{}", formatting["id"]);
    let (status, updated) = app
        .put(
            &uri,
            Some(&admin),
            json!({ "short_description": "Formatting", "content": "Use A4 or Letter.", "lead": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "Use A4 or Letter.");

    let (status, _) = app.delete(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete(&uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, items) = app.get("/api/help", Some(&author)).await;
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0]["id"], overview["id"]);
}

#[tokio::test]
async fn test_submission_window_management() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token("root-user", Role::Superuser).await;
    let now = Utc::now();

    // Close before open is rejected
    let (status, _) = app
        .put(
            "/api/admin/submission_window",
            Some(&admin),
            json!({
                "open_date": now + Duration::days(5),
                "close_date": now + Duration::days(1)
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .put(
            "/api/admin/submission_window",
            Some(&admin),
            json!({
                "open_date": now + Duration::days(1),
                "close_date": now + Duration::days(5)
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, site) = app.get("/api/site", None).await;
    assert_eq!(site["submission_window"]["state"], "not_yet_open");

    let (status, _) = app
        .put(
            "/api/admin/submission_window",
            Some(&admin),
            json!({
                "open_date": now - Duration::days(5),
                "close_date": now - Duration::days(1)
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, site) = app.get("/api/site", None).await;
    assert_eq!(site["submission_window"]["state"], "closed");

    app.open_submissions().await;
    let (_, site) = app.get("/api/site", None).await;
    assert_eq!(site["submission_window"]["state"], "open");

    let (status, _) = app.delete("/api/admin/submission_window", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, site) = app.get("/api/site", None).await;
    assert_eq!(site["submission_window"]["state"], "not_configured");
    assert!(site["submission_window"]["open_date"].is_null());
}

#[tokio::test]
async fn test_registration_switch() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token("root-user", Role::Superuser).await;

    let (status, _) = app
        .put("/api/admin/registration", Some(&admin), json!({ "disabled": true }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, site) = app.get("/api/site", None).await;
    assert_eq!(site["registration_open"], false);

    app.put("/api/admin/registration", Some(&admin), json!({ "disabled": false }))
        .await;
    let (_, site) = app.get("/api/site", None).await;
    assert_eq!(site["registration_open"], true);
}

#[tokio::test]
async fn test_committee_membership_grants_listing() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token("root-user", Role::Superuser).await;
    let (_, token) = app.user_with_token("nina", Role::Author).await;

    let (status, _) = app.get("/api/submissions", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put("/api/admin/users/nina/committee", Some(&admin), json!({ "member": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_committee"], true);

    // Membership is read per request, the existing session picks it up
    let (status, _) = app.get("/api/submissions", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, site) = app.get("/api/site", Some(&token)).await;
    assert_eq!(site["user"]["is_committee"], true);

    app.put("/api/admin/users/nina/committee", Some(&admin), json!({ "member": false }))
        .await;
    let (status, _) = app.get("/api/submissions", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .put("/api/admin/users/ghost/committee", Some(&admin), json!({ "member": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_superuser_command() {
    let app = TestApp::new().await;
    let config = test_config();

    let user = cfp_web::api::create_superuser(
        app.db(),
        &config,
        "organiser",
        "organiser@example.org",
        "granite-lantern-884",
    )
    .await
    .unwrap();
    assert!(user.is_superuser);
    assert!(user.is_active);

    let duplicate = cfp_web::api::create_superuser(
        app.db(),
        &config,
        "organiser",
        "other@example.org",
        "granite-lantern-884",
    )
    .await;
    assert!(duplicate.is_err());

    let weak = cfp_web::api::create_superuser(app.db(), &config, "second", "s@example.org", "short")
        .await;
    assert!(weak.is_err());

    let non_ascii = cfp_web::api::create_superuser(
        app.db(),
        &config,
        "organisátor",
        "o@example.org",
        "granite-lantern-884",
    )
    .await;
    assert!(non_ascii.is_err());
}
