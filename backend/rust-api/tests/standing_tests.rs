mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_stats_count_completed_parts() {
    let app = common::create_test_app().await;
    let (_, token) = app.learner().await;

    app.submit(&token, "e-code", json!("Hello, world!")).await;
    app.submit(&token, "e-lit", json!("cargo")).await;

    let (status, body) = app.get("/api/v1/users/me/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "total_exp": 60, "current_streak": 0, "completed_parts": 1 })
    );
}

#[tokio::test]
async fn test_me_routes_require_authentication() {
    let app = common::create_test_app().await;

    let (status, _) = app.get("/api/v1/users/me/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/v1/users/me/tree", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tree_stage_follows_exp() {
    let app = common::create_test_app().await;
    let (_, token) = app.learner_with_exp(450).await;

    let (status, body) = app.get("/api/v1/users/me/tree", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "sprout");
    assert_eq!(body["exp"], 450);
    assert_eq!(body["next_stage_exp"], 500);

    app.submit(&token, "e-code", json!("Hello, world!")).await;
    app.submit(&token, "e-lit", json!("cargo")).await;

    let (_, body) = app.get("/api/v1/users/me/tree", Some(&token)).await;
    assert_eq!(body["stage"], "small_tree");
    assert_eq!(body["exp"], 510);
    assert_eq!(body["next_stage_exp"], 1000);
}

#[tokio::test]
async fn test_leaderboard_orders_by_exp() {
    let app = common::create_test_app().await;
    let (low, _) = app.learner_with_exp(5).await;
    let (high, _) = app.learner_with_exp(900).await;
    let (mid, token) = app.learner_with_exp(300).await;

    let (status, body) = app.get("/api/v1/leaderboard", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["user_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![high.as_str(), mid.as_str(), low.as_str()]);
    assert_eq!(body[0]["total_exp"], 900);
    assert_eq!(body[0]["name"], "Test Learner");
}

#[tokio::test]
async fn test_unknown_account_stats_not_found() {
    let app = common::create_test_app().await;
    let token = common::token_for("nobody");

    let (status, body) = app.get("/api/v1/users/me/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User nobody not found");
}
