//! Review scoring and permissions

mod helpers;

use axum::http::StatusCode;
use helpers::*;
use serde_json::json;

fn review(expertise: i64, score: i64) -> serde_json::Value {
    json!({
        "expertise_score": expertise,
        "submission_score": score,
        "comments": "Solid work."
    })
}

struct Fixture {
    app: TestApp,
    author: String,
    pc_one: String,
    pc_two: String,
    admin: String,
    submission: String,
}

async fn fixture() -> Fixture {
    let app = TestApp::new().await;
    app.open_submissions().await;
    let (_, author) = app.user_with_token("alice", Role::Author).await;
    let (_, pc_one) = app.user_with_token("carl", Role::Committee).await;
    let (_, pc_two) = app.user_with_token("dina", Role::Committee).await;
    let (_, admin) = app.user_with_token("root-user", Role::Superuser).await;
    let submission = app.submit(&author, "Reviewed Paper").await;

    Fixture {
        app,
        author,
        pc_one,
        pc_two,
        admin,
        submission,
    }
}

#[tokio::test]
async fn test_scores_aggregate_per_submission() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);

    let (status, body) = f.app.post(&uri, Some(&f.pc_one), review(4, 3)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["review"]["reviewer"], "carl");
    assert_eq!(body["scores"]["review_count"], 1);
    assert_eq!(body["scores"]["total_score"], 3);
    assert_eq!(body["scores"]["average_score"], 3.0);

    let (_, body) = f.app.post(&uri, Some(&f.pc_two), review(2, 5)).await;
    assert_eq!(body["scores"]["review_count"], 2);
    assert_eq!(body["scores"]["total_score"], 8);
    assert_eq!(body["scores"]["average_score"], 4.0);

    // A second submission keeps its own totals
    let other = f.app.submit(&f.author, "Unreviewed").await;
    let (_, view) = f
        .app
        .get(&format!("/api/submissions/{}", other), Some(&f.admin))
        .await;
    assert_eq!(view["submission"]["review_count"], 0);
    assert!(view["submission"]["average_score"].is_null());

    let (_, view) = f
        .app
        .get(&format!("/api/submissions/{}", f.submission), Some(&f.pc_one))
        .await;
    assert_eq!(view["submission"]["review_count"], 2);
    assert_eq!(view["has_reviewed"], true);
    assert_eq!(view["can_review"], false);
    assert!(view["review_uuid"].is_string());
    let reviews = view["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0]["reviewer"], "carl");
}

#[tokio::test]
async fn test_one_review_per_reviewer() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);

    let (status, _) = f.app.post(&uri, Some(&f.pc_one), review(3, 3)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = f.app.post(&uri, Some(&f.pc_one), review(5, 5)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f.app.post(&uri, Some(&f.admin), review(1, 1)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = f.app.post(&uri, Some(&f.admin), review(1, 1)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_authors_cannot_review() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);

    let (status, _) = f.app.post(&uri, Some(&f.author), review(5, 5)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = format!("/api/submissions/{}/reviews", uuid::Uuid::new_v4());
    let (status, _) = f.app.post(&missing, Some(&f.pc_one), review(3, 3)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_score_range_is_validated() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);

    let (status, body) = f
        .app
        .post(&uri, Some(&f.pc_one), json!({ "expertise_score": 0, "comments": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = &body["error"]["fields"];
    assert!(fields["expertise_score"].is_array());
    assert!(fields["submission_score"].is_array());

    let (status, _) = f.app.post(&uri, Some(&f.pc_one), review(3, 6)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_review_window_closes_for_committee_not_superuser() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);
    let review_days = f.app.state.config.review_window_days;
    f.app.backdate_submission(&f.submission, review_days).await;

    let (status, _) = f.app.post(&uri, Some(&f.pc_one), review(3, 3)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = f.app.post(&uri, Some(&f.admin), review(3, 3)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_update_and_delete_recompute_scores() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);

    let (_, first) = f.app.post(&uri, Some(&f.pc_one), review(4, 2)).await;
    f.app.post(&uri, Some(&f.pc_two), review(4, 4)).await;
    let review_uri = format!("/api/reviews/{}", first["review"]["uuid"].as_str().unwrap());

    // Only the reviewer (or a superuser) may change it
    let (status, _) = f.app.put(&review_uri, Some(&f.pc_two), review(1, 1)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = f.app.get(&review_uri, Some(&f.author)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = f.app.put(&review_uri, Some(&f.pc_one), review(4, 5)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["review"]["submission_score"], 5);
    assert_eq!(body["scores"]["total_score"], 9);
    assert_eq!(body["scores"]["average_score"], 4.5);

    let (status, fetched) = f.app.get(&review_uri, Some(&f.pc_two)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["comments"], "Solid work.");

    let (status, scores) = f.app.delete(&review_uri, Some(&f.admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scores["review_count"], 1);
    assert_eq!(scores["total_score"], 4);
    assert_eq!(scores["average_score"], 4.0);

    let (status, _) = f.app.get(&review_uri, Some(&f.admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The reviewer can review again once their review is gone
    let (_, view) = f
        .app
        .get(&format!("/api/submissions/{}", f.submission), Some(&f.pc_one))
        .await;
    assert_eq!(view["can_review"], true);
}

#[tokio::test]
async fn test_committee_profile_lists_own_reviews() {
    let f = fixture().await;
    let uri = format!("/api/submissions/{}/reviews", f.submission);
    f.app.post(&uri, Some(&f.pc_one), review(3, 4)).await;

    let (_, profile) = f.app.get("/api/profile", Some(&f.pc_one)).await;
    assert_eq!(profile["is_committee"], true);
    assert_eq!(profile["reviews"].as_array().unwrap().len(), 1);

    let (_, profile) = f.app.get("/api/profile", Some(&f.author)).await;
    assert!(profile.get("reviews").is_none());
    assert_eq!(profile["submissions"][0]["review_count"], 1);

    let (status, body) = f.app.get("/api/submissions", Some(&f.pc_one)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submissions"][0]["reviewed_by_me"], true);
}
