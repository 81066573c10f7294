mod common;

use axum::http::StatusCode;
use common::TestApp;

#[tokio::test]
async fn identity_report_requires_a_session() {
    let app = TestApp::spawn().await;

    let (status, _) = app.get("/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn identity_report_covers_the_configured_orgs() {
    let app = TestApp::spawn().await;
    app.platform
        .grant_team("acme", "infrastructure-admins", "alice");
    app.platform.grant_team("acme", "owners", "alice");
    app.platform.set_repos(
        "acme",
        vec!["acme/dev-tools".to_string(), "acme/dev-site".to_string()],
    );
    let token = app.session_token("alice@example.com");

    let (status, body) = app.get("/me", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");

    let org = &body["github"]["acme"];
    let teams: Vec<&str> = org["teams"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap())
        .collect();
    assert_eq!(teams, vec!["infrastructure-admins", "owners"]);
    assert_eq!(org["accessible_repos"].as_array().unwrap().len(), 2);
    // Token metadata, never the token itself.
    assert!(org["token"]["expires_at"].is_string());
    assert!(org["token"].get("token").is_none());

    assert_eq!(body["flags"]["acme"]["is_admin"], true);
}

#[tokio::test]
async fn identity_report_marks_non_admins() {
    let app = TestApp::spawn().await;
    app.platform
        .grant_team("acme", "infrastructure-admins", "bob");
    let token = app.session_token("bob@example.com");

    let (status, body) = app.get("/me", Some(&token)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flags"]["acme"]["is_admin"], false);
}
