mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use control_api::permissions::Role;

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

// ---------------------------------------------------------------------------
// POST /api/v1/admin/bans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ban_via_http_persists_and_logs() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);

    let resp = server
        .post("/api/v1/admin/bans")
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&serde_json::json!({ "userId": "u1", "reason": "spam" }))
        .await;
    resp.assert_status(StatusCode::CREATED);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["ban"]["userId"], "u1");
    assert_eq!(body["ban"]["reason"], "spam");
    assert_eq!(body["ban"]["bannedBy"], "opr_1");
    assert_eq!(body["notifiedLive"], false);

    assert!(state.statuses.get("u1").unwrap().is_banned());

    let log = state.commands.recent();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].command, "admin:ban_user");
    assert!(log[0].success);
}

#[tokio::test]
async fn ban_without_reason_uses_default() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);

    let resp = server
        .post("/api/v1/admin/bans")
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&serde_json::json!({ "userId": "u1" }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["ban"]["reason"], "Policy violation");
    assert_eq!(
        state.statuses.get("u1").unwrap().ban_reason.as_deref(),
        Some("Policy violation")
    );
}

#[tokio::test]
async fn banning_twice_conflicts() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);

    for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
        server
            .post("/api/v1/admin/bans")
            .add_header(AUTHORIZATION, bearer(&admin))
            .json(&serde_json::json!({ "userId": "u1" }))
            .await
            .assert_status(expected);
    }

    // The failed attempt is logged too.
    let log = state.commands.recent();
    assert_eq!(log.len(), 2);
    assert!(!log[0].success);
}

#[tokio::test]
async fn self_ban_is_bad_request() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);

    server
        .post("/api/v1/admin/bans")
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&serde_json::json!({ "userId": "opr_1" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert!(state.statuses.get("opr_1").is_none());
}

#[tokio::test]
async fn oversized_reason_fails_validation() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);

    let res = server
        .post("/api/v1/admin/bans")
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&serde_json::json!({ "userId": "u1", "reason": "x".repeat(501) }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = res.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "reason");
    assert!(state.statuses.get("u1").is_none());
}

#[tokio::test]
async fn ban_requires_ban_users_permission() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let viewer = common::mint(&state, "opr_v", Role::Viewer);
    let user = common::mint(&state, "u9", Role::User);

    for token in [viewer, user] {
        server
            .post("/api/v1/admin/bans")
            .add_header(AUTHORIZATION, bearer(&token))
            .json(&serde_json::json!({ "userId": "u1" }))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
    assert!(state.statuses.get("u1").is_none());
}

#[tokio::test]
async fn ban_requires_credential() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();

    server
        .post("/api/v1/admin/bans")
        .json(&serde_json::json!({ "userId": "u1" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/api/v1/admin/bans")
        .add_header(AUTHORIZATION, "Token abc")
        .json(&serde_json::json!({ "userId": "u1" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// GET/DELETE /api/v1/admin/bans/{user_id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ban_status_reflects_ban_and_lift() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let viewer = common::mint(&state, "opr_v", Role::Viewer);

    server
        .get("/api/v1/admin/bans/u1")
        .add_header(AUTHORIZATION, bearer(&viewer))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    server
        .post("/api/v1/admin/bans")
        .add_header(AUTHORIZATION, bearer(&admin))
        .json(&serde_json::json!({ "userId": "u1", "reason": "spam" }))
        .await
        .assert_status(StatusCode::CREATED);

    let resp = server
        .get("/api/v1/admin/bans/u1")
        .add_header(AUTHORIZATION, bearer(&viewer))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["reason"], "spam");
    assert_eq!(body["bannedBy"], "opr_1");

    // Viewers may look but not lift.
    server
        .delete("/api/v1/admin/bans/u1")
        .add_header(AUTHORIZATION, bearer(&viewer))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .delete("/api/v1/admin/bans/u1")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    assert!(!state.statuses.get("u1").unwrap().is_banned());
    server
        .delete("/api/v1/admin/bans/u1")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// GET /api/v1/admin/commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_log_is_newest_first_and_admin_only() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let user = common::mint(&state, "u9", Role::User);

    for target in ["u1", "u2"] {
        server
            .post("/api/v1/admin/bans")
            .add_header(AUTHORIZATION, bearer(&admin))
            .json(&serde_json::json!({ "userId": target }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let resp = server
        .get("/api/v1/admin/commands")
        .add_header(AUTHORIZATION, bearer(&admin))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["data"]["userId"], "u2");
    assert_eq!(entries[1]["data"]["userId"], "u1");
    assert_eq!(entries[0]["type"], "admin:ban_user");
    assert_eq!(entries[0]["operatorId"], "opr_1");

    server
        .get("/api/v1/admin/commands")
        .add_header(AUTHORIZATION, bearer(&user))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}
