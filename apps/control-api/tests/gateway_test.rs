mod common;

use std::time::Duration;

use control_api::config::Config;
use control_api::permissions::Role;
use serde_json::json;

use common::{connect, connect_as, expect_close, expect_silence, recv_json, send_json};

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_is_answered_before_auth() {
    let addr = common::start_server(common::test_state()).await;
    let mut ws = connect(addr).await;

    send_json(&mut ws, json!({ "type": "ping" })).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "pong");
    assert!(reply["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn admin_auth_reports_identity() {
    let state = common::test_state();
    let token = common::mint(&state, "opr_1", Role::Admin);
    let addr = common::start_server(state).await;

    let (_ws, data) = connect_as(addr, &token).await;
    assert_eq!(data["operatorId"], "opr_1");
    assert_eq!(data["role"], "admin");
    assert_eq!(data["isAdmin"], true);
    assert!(data["connectionId"].as_str().unwrap().starts_with("conn_"));
    assert!(data["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == "ban_users"));
}

#[tokio::test]
async fn invalid_credential_gets_auth_error_then_close_4001() {
    let addr = common::start_server(common::test_state()).await;
    let mut ws = connect(addr).await;

    send_json(
        &mut ws,
        json!({ "type": "auth", "data": { "credential": "not-a-jwt" } }),
    )
    .await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "auth:error");
    assert_eq!(reply["data"]["code"], "invalid_credential");
    assert_eq!(expect_close(&mut ws).await, Some(4001));
}

#[tokio::test]
async fn second_auth_is_rejected_and_identity_kept() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let other = common::mint(&state, "opr_2", Role::SuperAdmin);
    let addr = common::start_server(state.clone()).await;

    let (mut ws, first) = connect_as(addr, &admin).await;
    send_json(
        &mut ws,
        json!({ "type": "auth", "data": { "credential": other } }),
    )
    .await;

    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "auth:error");
    assert_eq!(reply["data"]["code"], "already_authenticated");

    // Still open, still the first identity.
    send_json(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
    let info = state
        .registry
        .connection(first["connectionId"].as_str().unwrap())
        .expect("connection registered");
    assert_eq!(info.identity.unwrap().operator_id, "opr_1");
}

#[tokio::test]
async fn three_malformed_messages_close_with_4002() {
    let addr = common::start_server(common::test_state()).await;
    let mut ws = connect(addr).await;

    for _ in 0..3 {
        ws_send_raw(&mut ws, "{not json").await;
        let reply = recv_json(&mut ws).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["data"]["code"], "invalid_format");
    }
    assert_eq!(expect_close(&mut ws).await, Some(4002));
}

#[tokio::test]
async fn well_formed_message_resets_malformed_streak() {
    let addr = common::start_server(common::test_state()).await;
    let mut ws = connect(addr).await;

    for _ in 0..2 {
        ws_send_raw(&mut ws, "garbage").await;
        recv_json(&mut ws).await;
    }
    send_json(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");

    for _ in 0..2 {
        send_json(&mut ws, json!({ "type": "no_such_command" })).await;
        assert_eq!(recv_json(&mut ws).await["data"]["code"], "invalid_format");
    }
    send_json(&mut ws, json!({ "type": "ping" })).await;
    assert_eq!(recv_json(&mut ws).await["type"], "pong");
}

#[tokio::test]
async fn unauthenticated_connection_times_out_with_4008() {
    let mut config = Config::for_development();
    config.auth_timeout = Duration::from_millis(200);
    let addr = common::start_server(common::test_state_with(config)).await;
    let mut ws = connect(addr).await;

    assert_eq!(expect_close(&mut ws).await, Some(4008));
}

#[tokio::test]
async fn silent_connection_times_out_with_4009() {
    let mut config = Config::for_development();
    config.idle_timeout = Duration::from_millis(300);
    let state = common::test_state_with(config);
    let token = common::mint(&state, "opr_1", Role::Admin);
    let addr = common::start_server(state.clone()).await;

    let (mut ws, _) = connect_as(addr, &token).await;
    assert_eq!(expect_close(&mut ws).await, Some(4009));
    assert_eq!(state.registry.admin_count(), 0);
}

// ---------------------------------------------------------------------------
// Admin commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_admin_cannot_run_admin_commands() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let user = common::mint(&state, "u1", Role::User);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;
    let (mut user_ws, _) = connect_as(addr, &user).await;

    let commands = [
        json!({ "type": "admin:broadcast", "data": { "message": "hi" } }),
        json!({ "type": "admin:ban_user", "data": { "userId": "u2" } }),
        json!({ "type": "admin:refresh_analytics" }),
        json!({ "type": "admin:announce", "data": { "title": "t", "body": "b" } }),
        json!({ "type": "admin:force_reload" }),
        json!({ "type": "admin:read_only", "data": { "enabled": true } }),
    ];
    for command in commands {
        send_json(&mut user_ws, command).await;
        let reply = recv_json(&mut user_ws).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["data"]["code"], "permission_denied");
    }

    // No side effects anywhere.
    expect_silence(&mut admin_ws, Duration::from_millis(200)).await;
    assert!(state.statuses.get("u2").is_none());
    assert!(state.commands.recent().is_empty());

    // The connection is still usable.
    send_json(&mut user_ws, json!({ "type": "ping" })).await;
    assert_eq!(recv_json(&mut user_ws).await["type"], "pong");
}

#[tokio::test]
async fn broadcast_reaches_every_admin_including_sender() {
    let state = common::test_state();
    let a = common::mint(&state, "opr_a", Role::Admin);
    let b = common::mint(&state, "opr_b", Role::Viewer);
    let addr = common::start_server(state).await;

    let (mut ws_a, _) = connect_as(addr, &a).await;
    let (mut ws_b, _) = connect_as(addr, &b).await;

    send_json(
        &mut ws_a,
        json!({ "type": "admin:broadcast", "data": { "message": "maintenance at noon" } }),
    )
    .await;

    for ws in [&mut ws_a, &mut ws_b] {
        let msg = recv_json(ws).await;
        assert_eq!(msg["type"], "broadcast");
        assert_eq!(msg["data"]["message"], "maintenance at noon");
        assert_eq!(msg["data"]["from"], "opr_a");
    }
}

#[tokio::test]
async fn unregistered_admin_receives_nothing_further() {
    let state = common::test_state();
    let a = common::mint(&state, "opr_a", Role::Admin);
    let b = common::mint(&state, "opr_b", Role::Admin);
    let addr = common::start_server(state.clone()).await;

    let (mut ws_a, _) = connect_as(addr, &a).await;
    let (ws_b, _) = connect_as(addr, &b).await;
    drop(ws_b);

    // Wait until the server task has unregistered the dropped socket.
    for _ in 0..50 {
        if state.registry.admin_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.registry.admin_count(), 1);

    send_json(&mut ws_a, json!({ "type": "admin:refresh_analytics" })).await;
    let msg = recv_json(&mut ws_a).await;
    assert_eq!(msg["type"], "analytics_refresh");
    assert_eq!(msg["data"]["triggeredBy"], "opr_a");
}

#[tokio::test]
async fn announce_fans_out_to_users_and_acks() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::SuperAdmin);
    let u1 = common::mint(&state, "u1", Role::User);
    let u2 = common::mint(&state, "u2", Role::User);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;
    let (mut ws_u1, _) = connect_as(addr, &u1).await;
    let (mut ws_u2, _) = connect_as(addr, &u2).await;

    send_json(
        &mut admin_ws,
        json!({ "type": "admin:announce", "data": { "title": "Heads up", "body": "Deploy soon" } }),
    )
    .await;

    let ack = recv_json(&mut admin_ws).await;
    assert_eq!(ack["type"], "command_ack");
    assert_eq!(ack["data"]["command"], "admin:announce");
    assert_eq!(ack["data"]["delivered"], 2);

    for ws in [&mut ws_u1, &mut ws_u2] {
        let msg = recv_json(ws).await;
        assert_eq!(msg["type"], "announcement");
        assert_eq!(msg["data"]["title"], "Heads up");
        assert_eq!(msg["data"]["ttlSec"], 60);
        assert_eq!(msg["data"]["from"], "opr_1");
    }

    let log = state.commands.recent();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].command, "admin:announce");
}

#[tokio::test]
async fn announce_requires_edit_system_settings() {
    let state = common::test_state();
    // Admin's default permissions do not include edit_system_settings.
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let addr = common::start_server(state).await;

    let (mut ws, _) = connect_as(addr, &admin).await;
    send_json(&mut ws, json!({ "type": "admin:read_only", "data": { "enabled": true } })).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["data"]["code"], "permission_denied");
}

// ---------------------------------------------------------------------------
// Ban propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ban_reaches_admin_and_target_live_connection() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let user = common::mint(&state, "u1", Role::User);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;
    let (mut user_ws, _) = connect_as(addr, &user).await;

    send_json(
        &mut admin_ws,
        json!({ "type": "admin:ban_user", "data": { "userId": "u1", "reason": "spam" } }),
    )
    .await;

    let result = recv_json(&mut admin_ws).await;
    assert_eq!(result["type"], "ban_executed");
    assert_eq!(result["data"]["targetUserId"], "u1");
    assert_eq!(result["data"]["success"], true);

    let notice = recv_json(&mut user_ws).await;
    assert_eq!(notice["type"], "ban_executed");
    assert_eq!(notice["data"]["reason"], "spam");
    assert_eq!(notice["data"]["bannedBy"], "opr_1");

    let row = state.statuses.get("u1").expect("row persisted");
    assert!(row.is_banned());
    assert_eq!(notice["data"]["timestamp"], row.updated_at);
}

#[tokio::test]
async fn ban_failure_is_reported_to_admin_only() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let user = common::mint(&state, "u1", Role::User);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;
    let (mut user_ws, _) = connect_as(addr, &user).await;

    send_json(
        &mut admin_ws,
        json!({ "type": "admin:ban_user", "data": { "userId": "opr_1" } }),
    )
    .await;

    let result = recv_json(&mut admin_ws).await;
    assert_eq!(result["data"]["success"], false);
    assert!(result["data"]["error"].as_str().is_some());
    expect_silence(&mut user_ws, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn banned_operator_receives_live_notice() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let moderator = common::mint(&state, "opr_mod", Role::Admin);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;
    let (mut moderator_ws, _) = connect_as(addr, &moderator).await;

    send_json(
        &mut admin_ws,
        json!({ "type": "admin:ban_user", "data": { "userId": "opr_mod", "reason": "abuse" } }),
    )
    .await;

    let result = recv_json(&mut admin_ws).await;
    assert_eq!(result["data"]["targetUserId"], "opr_mod");
    assert_eq!(result["data"]["success"], true);

    let notice = recv_json(&mut moderator_ws).await;
    assert_eq!(notice["type"], "ban_executed");
    assert_eq!(notice["data"]["reason"], "abuse");
    assert_eq!(notice["data"]["bannedBy"], "opr_1");
    assert!(state.statuses.get("opr_mod").expect("row persisted").is_banned());
}

#[tokio::test]
async fn announce_skips_operator_connections() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::SuperAdmin);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;

    send_json(
        &mut admin_ws,
        json!({ "type": "admin:announce", "data": { "title": "t", "body": "b" } }),
    )
    .await;

    let ack = recv_json(&mut admin_ws).await;
    assert_eq!(ack["type"], "command_ack");
    assert_eq!(ack["data"]["delivered"], 0);
    expect_silence(&mut admin_ws, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn newest_connection_of_a_user_wins() {
    let state = common::test_state();
    let admin = common::mint(&state, "opr_1", Role::Admin);
    let user = common::mint(&state, "u1", Role::User);
    let addr = common::start_server(state.clone()).await;

    let (mut admin_ws, _) = connect_as(addr, &admin).await;
    let (mut old_ws, _) = connect_as(addr, &user).await;
    let (mut new_ws, new_info) = connect_as(addr, &user).await;

    assert_eq!(
        state.registry.user_connection("u1").as_deref(),
        new_info["connectionId"].as_str()
    );

    send_json(
        &mut admin_ws,
        json!({ "type": "admin:ban_user", "data": { "userId": "u1", "reason": "spam" } }),
    )
    .await;
    assert_eq!(recv_json(&mut admin_ws).await["data"]["success"], true);

    assert_eq!(recv_json(&mut new_ws).await["type"], "ban_executed");
    expect_silence(&mut old_ws, Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_feed_delivers_ban_row_for_subscribed_user() {
    let state = common::test_state();
    let admin_token = common::mint(&state, "opr_1", Role::Admin);
    let user_token = common::mint(&state, "u1", Role::User);
    let admin = common::identity(&state, &admin_token).await;
    let addr = common::start_server(state.clone()).await;

    let (mut feed, _) = tokio_tungstenite::connect_async(format!(
        "ws://{addr}/changes/user_status?token={user_token}"
    ))
    .await
    .expect("feed connect");

    // Give the server a moment to subscribe before the write.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Another user's ban is filtered out.
    state.bans.execute(&admin, "u2", Some("other")).await.unwrap();
    let outcome = state.bans.execute(&admin, "u1", None).await.unwrap();

    let change = recv_json(&mut feed).await;
    assert_eq!(change["event_type"], "INSERT");
    assert_eq!(change["table"], "user_status");
    assert_eq!(change["new"]["user_id"], "u1");
    assert_eq!(change["new"]["status"], "banned");
    assert_eq!(change["new"]["ban_reason"], "Policy violation");
    assert_eq!(change["new"]["updated_at"], outcome.record.banned_at);
}

#[tokio::test]
async fn change_feed_sends_snapshot_to_already_banned_user() {
    let state = common::test_state();
    let admin_token = common::mint(&state, "opr_1", Role::Admin);
    let user_token = common::mint(&state, "u1", Role::User);
    let admin = common::identity(&state, &admin_token).await;
    state.bans.execute(&admin, "u1", Some("spam")).await.unwrap();
    let addr = common::start_server(state).await;

    // The credential predates the ban and is revoked for the bus, but the
    // feed still accepts it.
    let (mut feed, _) = tokio_tungstenite::connect_async(format!(
        "ws://{addr}/changes/user_status?token={user_token}"
    ))
    .await
    .expect("feed connect");

    let change = recv_json(&mut feed).await;
    assert_eq!(change["event_type"], "SNAPSHOT");
    assert_eq!(change["new"]["ban_reason"], "spam");
}

#[tokio::test]
async fn change_feed_rejects_bad_token() {
    let addr = common::start_server(common::test_state()).await;
    let result =
        tokio_tungstenite::connect_async(format!("ws://{addr}/changes/user_status?token=nope")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn banned_user_credential_no_longer_authenticates() {
    let state = common::test_state();
    let admin_token = common::mint(&state, "opr_1", Role::Admin);
    let user_token = common::mint(&state, "u1", Role::User);
    let admin = common::identity(&state, &admin_token).await;
    state.bans.execute(&admin, "u1", Some("spam")).await.unwrap();
    let addr = common::start_server(state).await;

    let mut ws = connect(addr).await;
    send_json(
        &mut ws,
        json!({ "type": "auth", "data": { "credential": user_token } }),
    )
    .await;
    assert_eq!(recv_json(&mut ws).await["type"], "auth:error");
    assert_eq!(expect_close(&mut ws).await, Some(4001));
}

async fn ws_send_raw(ws: &mut common::WsClient, text: &str) {
    use futures_util::SinkExt;
    ws.send(tokio_tungstenite::tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("ws send");
}
