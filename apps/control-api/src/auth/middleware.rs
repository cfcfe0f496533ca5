//! Bearer credential extraction for the operator HTTP routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::auth::credentials::OperatorIdentity;
use crate::error::ApiError;
use crate::permissions::Permission;
use crate::AppState;

/// Operator extracted from the `Authorization: Bearer <credential>` header.
#[derive(Debug, Clone)]
pub struct AuthOperator(pub OperatorIdentity);

impl AuthOperator {
    /// Require an operator role, optionally with a specific permission.
    pub fn require(&self, permission: Option<Permission>) -> Result<&OperatorIdentity, ApiError> {
        if !self.0.is_admin() {
            return Err(ApiError::forbidden("Admin access required"));
        }
        if let Some(permission) = permission {
            if !self.0.has_permission(permission) {
                return Err(ApiError::forbidden(format!("Missing permission: {}", permission.as_str())));
            }
        }
        Ok(&self.0)
    }
}

impl FromRequestParts<AppState> for AuthOperator {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let identity = state
            .verifier
            .verify(token)
            .await
            .map_err(|e| ApiError::unauthorized(e.to_string()))?;

        Ok(AuthOperator(identity))
    }
}

/// The bearer credential carried by `headers`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))
}
