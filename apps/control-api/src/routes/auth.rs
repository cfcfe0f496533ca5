//! Operator auth routes: password login, refresh rotation, logout.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::credentials::ACCESS_TTL_SECS;
use crate::auth::login::{OperatorAccount, TokenPair};
use crate::auth::middleware::bearer_token;
use crate::error::{ApiError, ApiErrorBody};
use crate::permissions::{Permission, Role};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub operator: OperatorInfo,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OperatorInfo {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl TokenResponse {
    fn new(account: OperatorAccount, pair: TokenPair) -> Self {
        Self {
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TTL_SECS,
            operator: OperatorInfo {
                permissions: account.effective_permissions(),
                id: account.id,
                email: account.email,
                display_name: account.display_name,
                role: account.role,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid email or password", body = ApiErrorBody),
        (status = 423, description = "Account locked", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (account, pair) = state.logins.login(&body.email, &body.password).await?;
    Ok(Json(TokenResponse::new(account, pair)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/refresh
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New credential pair", body = TokenResponse),
        (status = 401, description = "Invalid or spent refresh token", body = ApiErrorBody),
    ),
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let (account, pair) = state.logins.refresh(&body.refresh_token)?;
    Ok(Json(TokenResponse::new(account, pair)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/logout
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Invalid refresh token", body = ApiErrorBody),
    ),
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LogoutRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(refresh_token) = &body.refresh_token {
        state.logins.logout(refresh_token)?;
    }

    // The access credential is optional here; an invalid one is ignored.
    if let Ok(token) = bearer_token(&headers) {
        if let Ok(identity) = state.verifier.verify(token).await {
            state
                .verifier
                .revoke_token(&identity.credential_id, identity.expires_at)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
