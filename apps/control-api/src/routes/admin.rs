//! Operator HTTP routes: bans and the command log.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthOperator;
use crate::bans::delegate::BanRecord;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::error::BusError;
use crate::gateway::history::CommandRecord;
use crate::permissions::Permission;
use crate::AppState;

const MAX_REASON_CHARS: usize = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/bans", post(ban_user))
        .route("/admin/bans/{user_id}", get(ban_status).delete(lift_ban))
        .route("/admin/commands", get(list_commands))
}

// ---------------------------------------------------------------------------
// POST /api/v1/admin/bans
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BanResponse {
    pub ban: BanRecord,
    /// Whether the user had a live connection that was pushed to.
    pub notified_live: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/bans",
    tag = "Bans",
    request_body = BanRequest,
    responses(
        (status = 201, description = "User banned", body = BanResponse),
        (status = 400, description = "Invalid target or reason", body = ApiErrorBody),
        (status = 403, description = "Missing ban_users", body = ApiErrorBody),
        (status = 409, description = "Already banned", body = ApiErrorBody),
    ),
    security(("bearer" = [])),
)]
pub async fn ban_user(
    State(state): State<AppState>,
    operator: AuthOperator,
    Json(body): Json<BanRequest>,
) -> Result<(StatusCode, Json<BanResponse>), ApiError> {
    let actor = operator.require(Some(Permission::BanUsers))?;

    if body
        .reason
        .as_deref()
        .is_some_and(|r| r.chars().count() > MAX_REASON_CHARS)
    {
        return Err(ApiError::validation(vec![FieldError {
            field: "reason".to_string(),
            message: format!("must be at most {MAX_REASON_CHARS} characters"),
        }]));
    }

    let outcome = state
        .bans
        .execute(actor, &body.user_id, body.reason.as_deref())
        .await
        .map_err(|e| ApiError::from_bus(&BusError::from(e)))?;

    Ok((
        StatusCode::CREATED,
        Json(BanResponse {
            ban: outcome.record,
            notified_live: outcome.notified_live,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET/DELETE /api/v1/admin/bans/{user_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/bans/{user_id}",
    tag = "Bans",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Current ban", body = BanRecord),
        (status = 404, description = "User is not banned", body = ApiErrorBody),
    ),
    security(("bearer" = [])),
)]
pub async fn ban_status(
    State(state): State<AppState>,
    operator: AuthOperator,
    Path(user_id): Path<String>,
) -> Result<Json<BanRecord>, ApiError> {
    operator.require(Some(Permission::ViewUsers))?;

    state
        .bans
        .delegate()
        .ban_status(&user_id)
        .await
        .map_err(|e| ApiError::from_bus(&BusError::from(e)))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User is not banned"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/bans/{user_id}",
    tag = "Bans",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "Ban lifted"),
        (status = 404, description = "User is not banned", body = ApiErrorBody),
    ),
    security(("bearer" = [])),
)]
pub async fn lift_ban(
    State(state): State<AppState>,
    operator: AuthOperator,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = operator.require(Some(Permission::BanUsers))?;

    let lifted = state
        .bans
        .delegate()
        .lift_ban(&user_id)
        .await
        .map_err(|e| ApiError::from_bus(&BusError::from(e)))?;
    if !lifted {
        return Err(ApiError::not_found("User is not banned"));
    }

    tracing::info!(%user_id, operator_id = %actor.operator_id, "ban lifted via HTTP");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/admin/commands
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct CommandLogResponse {
    pub data: Vec<CommandRecord>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/commands",
    tag = "Commands",
    responses(
        (status = 200, description = "Recent admin commands, newest first", body = CommandLogResponse),
        (status = 403, description = "Not an operator", body = ApiErrorBody),
    ),
    security(("bearer" = [])),
)]
pub async fn list_commands(
    State(state): State<AppState>,
    operator: AuthOperator,
) -> Result<Json<CommandLogResponse>, ApiError> {
    operator.require(None)?;
    Ok(Json(CommandLogResponse {
        data: state.commands.recent(),
    }))
}
