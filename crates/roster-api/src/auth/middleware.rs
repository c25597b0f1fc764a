//! Authentication middleware for protecting routes
//!
//! Extracts and validates JWT tokens from the Authorization header.
//! On success, adds the authenticated account to request extensions.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use roster_core::UserRole;
use thiserror::Error;
use tracing::warn;

use super::jwt::{validate_access_token, Claims, JwtError};
use crate::audit::extract_ip_address;
use crate::error::ErrorResponse;
use crate::state::AppState;

/// Authenticated account extracted from JWT
///
/// This is added to request extensions by the auth middleware
/// and can be extracted in handlers using `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub username: String,
    pub role: UserRole,
    /// JWT token ID
    pub jti: String,
}

impl AuthenticatedUser {
    pub fn has_any_role(&self, roles: &[UserRole]) -> bool {
        roles.contains(&self.role)
    }
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = JwtError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = claims.user_id().ok_or(JwtError::InvalidClaims)?;
        let role = claims.role().ok_or(JwtError::InvalidClaims)?;
        Ok(Self {
            user_id,
            username: claims.unique_name,
            role,
            jti: claims.jti,
        })
    }
}

/// Authentication middleware errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // 401 bodies never say which check failed
        let (status, message) = match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "Unauthorized."),
            AuthError::InsufficientPermissions => (StatusCode::FORBIDDEN, "Forbidden."),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

fn bearer_token(request: &Request<Body>) -> Result<&str, AuthError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)
}

/// Authentication middleware that requires a valid JWT token
///
/// This middleware:
/// 1. Extracts the Authorization header
/// 2. Validates the Bearer token format
/// 3. Validates the JWT signature, issuer, audience and expiration
/// 4. Adds AuthenticatedUser to request extensions
///
/// # Usage
///
/// ```ignore
/// let protected = Router::new()
///     .route("/users/profile", get(users::get_profile))
///     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let user = bearer_token(&request)
        .and_then(|token| Ok(validate_access_token(&state.jwt, token)?))
        .and_then(|claims| Ok(AuthenticatedUser::try_from(claims)?));

    let user = match user {
        Ok(user) => user,
        Err(e) => {
            warn!(
                target: "audit",
                reason = %e,
                path = %request.uri().path(),
                ip_address = ?extract_ip_address(request.headers()),
                "Rejected request credentials"
            );
            return Err(e);
        }
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>;

/// Middleware for requiring any of multiple roles
///
/// Must run inside [`auth_middleware`]; a request without an
/// authenticated account is rejected as unauthorized.
///
/// # Example
///
/// ```ignore
/// let admin_only = Router::new()
///     .route("/users", post(users::create_user))
///     .route_layer(middleware::from_fn(require_any_role(&[UserRole::Admin])));
/// ```
pub fn require_any_role(
    required_roles: &'static [UserRole],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AuthError::MissingAuthHeader)?;

            if !user.has_any_role(required_roles) {
                let required: Vec<&str> = required_roles.iter().map(|r| r.as_str()).collect();
                warn!(
                    target: "audit",
                    user_id = user.user_id,
                    username = %user.username,
                    role = %user.role,
                    required_roles = %required.join(","),
                    path = %request.uri().path(),
                    ip_address = ?extract_ip_address(request.headers()),
                    "Access denied"
                );

                return Err(AuthError::InsufficientPermissions);
            }

            Ok(next.run(request).await)
        })
    }
}
