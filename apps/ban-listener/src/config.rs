use std::time::Duration;

/// Ban listener configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base HTTP URL of the control API, e.g. `http://localhost:4010`.
    pub control_url: String,
    /// Access credential of the signed-in end user.
    pub user_credential: String,
    /// First reconnect delay; doubles on every failed attempt.
    pub reconnect_base: Duration,
    /// Upper bound for the reconnect delay.
    pub reconnect_max: Duration,
    /// Interval of the `ping` keeping the live connection under the server's idle timeout.
    pub heartbeat: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("CONTROL_URL").unwrap_or_else(|_| "http://localhost:4010".to_string()),
            required_var("USER_CREDENTIAL"),
        );
        config.reconnect_max = Duration::from_secs(parsed_var("RECONNECT_MAX_SECS", 30));
        config
    }

    pub fn new(control_url: impl Into<String>, user_credential: impl Into<String>) -> Self {
        Self {
            control_url: control_url.into().trim_end_matches('/').to_string(),
            user_credential: user_credential.into(),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            heartbeat: Duration::from_secs(30),
        }
    }

    /// Command bus WebSocket URL.
    pub fn ws_url(&self) -> String {
        format!("{}/ws", ws_base(&self.control_url))
    }

    /// Change-feed WebSocket URL for the current user.
    pub fn feed_url(&self) -> String {
        format!(
            "{}/changes/user_status?token={}",
            ws_base(&self.control_url),
            self.user_credential
        )
    }

    pub fn logout_url(&self) -> String {
        format!("{}/api/v1/auth/logout", self.control_url)
    }
}

fn ws_base(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_url.to_string()
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
