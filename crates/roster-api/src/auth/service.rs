//! Authentication service layer
//!
//! Validates credentials through the account service and issues access
//! tokens. A failed login never says whether the username exists.

use chrono::{DateTime, Utc};
use roster_core::AuditAction;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use super::jwt::{generate_access_token, JwtConfig};
use crate::audit::{AuditLog, RequestContext};
use crate::error::AppError;
use crate::users::UserService;

/// Login request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

/// Issued access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: UserService,
    audit: AuditLog,
    jwt: JwtConfig,
}

impl AuthService {
    pub fn new(users: UserService, audit: AuditLog, jwt: JwtConfig) -> Self {
        Self { users, audit, jwt }
    }

    /// Login with username and password
    ///
    /// # Returns
    ///
    /// * `Ok(Some(LoginResponse))` - Token and its absolute expiry
    /// * `Ok(None)` - Unknown username or wrong password, indistinguishably
    /// * `Err(AppError)` - Store, audit or signing failure
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<Option<LoginResponse>, AppError> {
        let username = username.trim();

        let Some(user) = self.users.authenticate(username, password).await? else {
            warn!(
                target: "audit",
                username = %username,
                ip_address = ?ctx.ip_address,
                "Login failed"
            );
            self.audit
                .record(
                    AuditAction::LoginFailed,
                    "User",
                    &format!("Username={username}"),
                    ctx,
                    Some(json!({ "description": "Invalid username or password" })),
                )
                .await?;
            return Ok(None);
        };

        let (token, expires_at) = generate_access_token(&self.jwt, &user)
            .map_err(|e| AppError::Internal(format!("Failed to issue token: {e}")))?;

        info!(user_id = user.id, username = %user.username, role = %user.role, "User logged in");
        Ok(Some(LoginResponse { token, expires_at }))
    }
}
