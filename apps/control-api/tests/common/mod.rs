#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use control_api::auth::credentials::OperatorIdentity;
use control_api::auth::login::OperatorAccount;
use control_api::config::Config;
use control_api::permissions::{Permission, Role};
use control_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_ID: &str = "opr_admin";
pub const VIEWER_EMAIL: &str = "viewer@example.com";
pub const VIEWER_ID: &str = "opr_viewer";
pub const PASSWORD: &str = "correct horse battery";

/// Low-cost Argon2id hash so login tests stay fast.
pub fn cheap_hash(password: &str) -> String {
    use argon2::{Algorithm, Argon2, Params, Version};
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(8, 1, 1, None).unwrap(),
    );
    argon2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .unwrap()
        .to_string()
}

pub fn test_accounts() -> Vec<OperatorAccount> {
    vec![
        OperatorAccount {
            id: ADMIN_ID.to_string(),
            email: ADMIN_EMAIL.to_string(),
            display_name: Some("Admin".to_string()),
            role: Role::Admin,
            permissions: None,
            password_hash: cheap_hash(PASSWORD),
        },
        OperatorAccount {
            id: VIEWER_ID.to_string(),
            email: VIEWER_EMAIL.to_string(),
            display_name: None,
            role: Role::Viewer,
            permissions: None,
            password_hash: cheap_hash(PASSWORD),
        },
    ]
}

pub fn test_state_with(config: Config) -> AppState {
    AppState::new(config, test_accounts())
}

pub fn test_state() -> AppState {
    test_state_with(Config::for_development())
}

/// Router + state for `axum-test`.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = control_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Mint an access credential carrying the role's default permissions.
pub fn mint(state: &AppState, subject: &str, role: Role) -> String {
    let permissions: Vec<Permission> = role.default_permissions();
    state
        .issuer
        .mint_access(subject, role, &permissions)
        .expect("mint credential")
        .token
}

pub async fn identity(state: &AppState, token: &str) -> OperatorIdentity {
    state.verifier.verify(token).await.expect("verify credential")
}

// ---------------------------------------------------------------------------
// Real TCP server + WebSocket client helpers
// ---------------------------------------------------------------------------

pub async fn start_server(state: AppState) -> SocketAddr {
    let app = control_api::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    ws
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// What the next meaningful frame turned out to be.
#[derive(Debug)]
pub enum Frame {
    Json(serde_json::Value),
    Close(Option<u16>),
}

/// Next text or close frame, skipping ping/pong.
pub async fn next_frame(ws: &mut WsClient) -> Frame {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame");
        match msg {
            Some(Ok(Message::Text(text))) => {
                return Frame::Json(serde_json::from_str(text.as_str()).expect("parse frame"));
            }
            Some(Ok(Message::Close(frame))) => return Frame::Close(frame.map(|f| u16::from(f.code))),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return Frame::Close(None),
        }
    }
}

pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    match next_frame(ws).await {
        Frame::Json(value) => value,
        Frame::Close(code) => panic!("expected a message, connection closed with {code:?}"),
    }
}

pub async fn expect_close(ws: &mut WsClient) -> Option<u16> {
    loop {
        match next_frame(ws).await {
            Frame::Close(code) => return code,
            Frame::Json(_) => continue,
        }
    }
}

/// Assert nothing arrives within `wait`.
pub async fn expect_silence(ws: &mut WsClient, wait: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = time::timeout(wait, ws.next()).await {
        panic!("unexpected message: {}", text.as_str());
    }
}

/// Connect and authenticate, returning the socket and the auth:success payload.
pub async fn connect_as(addr: SocketAddr, token: &str) -> (WsClient, serde_json::Value) {
    let mut ws = connect(addr).await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "auth", "data": { "credential": token } }),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "auth:success", "unexpected auth reply: {reply}");
    (ws, reply["data"].clone())
}
