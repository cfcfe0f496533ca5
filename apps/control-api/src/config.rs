use std::path::PathBuf;
use std::time::Duration;

/// Which `RoomRouter` implementation the command bus uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomBackend {
    /// Direct lookups in the in-process connection registry.
    Memory,
    /// Publish room envelopes to a pub/sub backplane relayed into the registry.
    Backplane,
}

/// Control API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Seed for the Ed25519 key that signs access credentials.
    pub access_key_seed: String,
    /// Seed for the Ed25519 key that signs refresh credentials.
    pub refresh_key_seed: String,
    /// `iss` claim written into and required on credentials.
    pub token_issuer: String,
    /// `aud` claim written into and required on credentials.
    pub token_audience: String,
    /// JSON file with the operator accounts. Optional; without it no operator can log in.
    pub operators_file: Option<PathBuf>,
    /// Cool-down after too many failed logins.
    pub lockout: Duration,
    /// How long a fresh connection may stay unauthenticated.
    pub auth_timeout: Duration,
    /// How long a connection may stay silent before it is closed.
    pub idle_timeout: Duration,
    pub room_backend: RoomBackend,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT", 4010),
            access_key_seed: required_var("ACCESS_KEY_SEED"),
            refresh_key_seed: required_var("REFRESH_KEY_SEED"),
            token_issuer: std::env::var("TOKEN_ISSUER").unwrap_or_else(|_| "warden-control".to_string()),
            token_audience: std::env::var("TOKEN_AUDIENCE").unwrap_or_else(|_| "admin-panel".to_string()),
            operators_file: std::env::var("OPERATORS_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            lockout: Duration::from_secs(parsed_var("LOCKOUT_SECS", 2 * 60 * 60)),
            auth_timeout: Duration::from_secs(parsed_var("AUTH_TIMEOUT_SECS", 10)),
            idle_timeout: Duration::from_secs(parsed_var("IDLE_TIMEOUT_SECS", 90)),
            room_backend: match std::env::var("ROOM_BACKEND").as_deref() {
                Ok("backplane") => RoomBackend::Backplane,
                _ => RoomBackend::Memory,
            },
        }
    }

    /// Configuration for tests and local tooling: fixed seeds, no operators file.
    pub fn for_development() -> Self {
        Self {
            port: 0,
            access_key_seed: "dev-access-seed-do-not-use-in-production".to_string(),
            refresh_key_seed: "dev-refresh-seed-do-not-use-in-production".to_string(),
            token_issuer: "warden-control".to_string(),
            token_audience: "admin-panel".to_string(),
            operators_file: None,
            lockout: Duration::from_secs(2 * 60 * 60),
            auth_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
            room_backend: RoomBackend::Memory,
        }
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
