use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use control_api::auth::login::load_accounts;
use control_api::config::Config;
use control_api::routes::RequestSpan;
use control_api::AppState;

#[tokio::main]
async fn main() {
    // Env vars may also be set externally, so a missing .env is fine.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let accounts = match &config.operators_file {
        Some(path) => load_accounts(path).expect("failed to load operators file"),
        None => {
            tracing::warn!("OPERATORS_FILE not set; operator login is disabled");
            Vec::new()
        }
    };

    tracing::info!(
        operators = accounts.len(),
        room_backend = ?config.room_backend,
        issuer = %config.token_issuer,
        "control-api configured"
    );

    let state = AppState::new(config, accounts);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(control_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "control-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
