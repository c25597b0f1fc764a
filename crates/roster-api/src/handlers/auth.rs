//! Authentication API handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::audit::RequestContext;
use crate::auth::{LoginRequest, LoginResponse};
use crate::error::AppError;
use crate::extract::ValidJson;
use crate::state::AppState;

/// Exchange credentials for an access token
///
/// An unknown username and a wrong password produce the same 401.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = crate::error::ErrorResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    state
        .auth
        .login(&request.username, &request.password, &ctx)
        .await?
        .map(Json)
        .ok_or(AppError::Unauthorized)
}
