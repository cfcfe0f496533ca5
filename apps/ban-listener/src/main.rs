use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ban_listener::config::Config;
use ban_listener::HttpSession;

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
    tracing::info!(control_url = %config.control_url, "ban-listener starting");

    let session = Arc::new(HttpSession::new(&config));

    tokio::select! {
        delivery = ban_listener::run(config, session.clone()) => {
            if let Some(delivery) = delivery {
                tracing::info!(
                    channel = delivery.channel.as_str(),
                    signed_in = session.is_signed_in(),
                    "listener terminal"
                );
            }
            std::process::exit(2);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }
}
