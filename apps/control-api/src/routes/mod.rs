pub mod admin;
pub mod auth;
pub mod health;

use axum::http::{Request, Uri};
use axum::Router;
use tower_http::trace::MakeSpan;
use tracing::Span;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(crate::feed::server::router())
        .nest("/api/v1", auth::router().merge(admin::router()))
}

/// Query parameters whose values never reach the request log.
const REDACTED_PARAMS: &[&str] = &["token"];

/// Request span for `TraceLayer`. Same fields as the default span, but the
/// change feed's `?token=` credential is masked.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::debug_span!(
            "request",
            method = %request.method(),
            uri = %loggable_uri(request.uri()),
            version = ?request.version(),
        )
    }
}

/// Path and query with every sensitive parameter value replaced.
pub fn loggable_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if REDACTED_PARAMS.contains(&name) => format!("{name}=[redacted]"),
            _ => pair.to_string(),
        })
        .collect();
    format!("{}?{}", uri.path(), masked.join("&"))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Auth
        auth::login,
        auth::refresh,
        auth::logout,
        // Bans
        admin::ban_user,
        admin::ban_status,
        admin::lift_ban,
        // Commands
        admin::list_commands,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Domain
            crate::permissions::Role,
            crate::permissions::Permission,
            crate::bans::delegate::BanRecord,
            crate::gateway::history::CommandRecord,
            // Route request/response types
            health::HealthResponse,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::LogoutRequest,
            auth::TokenResponse,
            auth::OperatorInfo,
            admin::BanRequest,
            admin::BanResponse,
            admin::CommandLogResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Operator authentication"),
        (name = "Bans", description = "Ban execution and status"),
        (name = "Commands", description = "Admin command log"),
    )
)]
pub struct ApiDoc;
