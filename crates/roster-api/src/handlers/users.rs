//! Account administration handlers
//!
//! Role checks happen in the router; handlers only see requests that have
//! already passed them.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};

use crate::audit::RequestContext;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::ValidJson;
use crate::state::AppState;
use crate::users::models::{GridQuery, GridRequest, GridResponse};
use crate::users::{
    CreateUserRequest, UpdateProfileRequest, UpdateUserRequest, UserListQuery, UserListResponse,
    UserPublic,
};

fn not_found() -> AppError {
    AppError::NotFound("User not found.".to_string())
}

fn query_error(rejection: QueryRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// Paged account list
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(UserListQuery),
    responses(
        (status = 200, description = "One page of accounts", body = UserListResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin or ReadOnlyUser role required", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<UserListQuery>, QueryRejection>,
) -> Result<Json<UserListResponse>, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let page = state.users.browse(&query, &ctx).await?;
    Ok(Json(page.into()))
}

/// Server-side grid data
#[utoipa::path(
    post,
    path = "/api/v1/users/dt",
    tag = "users",
    params(GridQuery),
    request_body = GridRequest,
    responses(
        (status = 200, description = "Grid page", body = GridResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn grid_users(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    query: Result<Query<GridQuery>, QueryRejection>,
    body: Result<Json<GridRequest>, JsonRejection>,
) -> Result<Json<GridResponse>, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let Json(request) = body.map_err(|r| AppError::BadRequest(r.body_text()))?;
    let response = state.users.grid(&request, query.role, &ctx).await?;
    Ok(Json(response))
}

/// Single account
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = UserPublic),
        (status = 404, description = "No such account", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<UserPublic>, AppError> {
    let id = path_id(path)?;
    state
        .users
        .view(id, &ctx)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// Create an account
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Account created", body = UserPublic),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 409, description = "Username taken", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    ValidJson(request): ValidJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.create(request, &ctx).await?;
    let location = format!("/api/v1/users/{}", user.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(user),
    ))
}

/// Replace email and role, optionally reset the password
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "Account id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Account updated", body = UserPublic),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 404, description = "No such account", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
    ValidJson(request): ValidJson<UpdateUserRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let id = path_id(path)?;
    Ok(Json(state.users.update(id, request, &ctx).await?))
}

/// Soft-delete an account
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 404, description = "No such account", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let id = path_id(path)?;
    if state.users.soft_delete(id, &ctx).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

/// The caller's own account
#[utoipa::path(
    get,
    path = "/api/v1/users/profile",
    tag = "users",
    responses(
        (status = 200, description = "Caller's account", body = UserPublic),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 404, description = "Account no longer exists", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserPublic>, AppError> {
    state
        .users
        .get(user.user_id)
        .await?
        .map(Json)
        .ok_or_else(not_found)
}

/// Update the caller's email and password
#[utoipa::path(
    put,
    path = "/api/v1/users/profile",
    tag = "users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserPublic),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 404, description = "Account no longer exists", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ctx: RequestContext,
    ValidJson(request): ValidJson<UpdateProfileRequest>,
) -> Result<Json<UserPublic>, AppError> {
    Ok(Json(
        state
            .users
            .update_profile(user.user_id, request, &ctx)
            .await?,
    ))
}
