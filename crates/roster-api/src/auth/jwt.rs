//! JWT token generation and validation
//!
//! Implements JWT-based authentication with HMAC-SHA256 signing.
//! Tokens are self-contained: request authorization reads the account id,
//! username and role from the claims without touching the store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use roster_core::{JwtSettings, User, UserRole};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT Claims structure containing account information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Audience, only present when one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Subject - account id
    pub sub: String,
    /// JWT ID - unique token identifier
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
    /// Account username
    pub unique_name: String,
    /// Role name, as in [`UserRole::as_str`]
    pub role: String,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn role(&self) -> Option<UserRole> {
        self.role.parse().ok()
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has unknown subject or role")]
    InvalidClaims,
}

/// JWT Configuration
///
/// Contains settings for token generation and validation
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing (at least 256 bits)
    pub secret: String,
    /// Token issuer identifier
    pub issuer: String,
    /// Expected audience; not checked when `None`
    pub audience: Option<String>,
    /// Access token lifetime
    pub expiration: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&JwtSettings::default())
    }
}

impl From<&JwtSettings> for JwtConfig {
    fn from(settings: &JwtSettings) -> Self {
        Self {
            secret: settings.secret.clone(),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            expiration: Duration::minutes(settings.expires_minutes),
        }
    }
}

/// Generate a JWT access token for an authenticated account
///
/// # Returns
///
/// * `Ok((String, DateTime<Utc>))` - Encoded token and its absolute expiry
/// * `Err(JwtError)` - If token generation fails
pub fn generate_access_token(
    config: &JwtConfig,
    user: &User,
) -> Result<(String, DateTime<Utc>), JwtError> {
    let now = Utc::now();
    let expires_at = now + config.expiration;

    let claims = Claims {
        iss: config.issuer.clone(),
        aud: config.audience.clone(),
        sub: user.id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        unique_name: user.username.clone(),
        role: user.role.as_str().to_string(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    // Report the second-resolution expiry that is actually in the token
    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .unwrap_or(expires_at);

    Ok((token, expires_at))
}

/// Validate a JWT access token and extract claims
///
/// Expiry is checked with zero leeway. The subject must be a numeric id and
/// the role a known role name.
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[&config.issuer]);
    match &config.audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::InvalidToken,
    })?;

    let claims = token_data.claims;
    if claims.user_id().is_none() || claims.role().is_none() {
        return Err(JwtError::InvalidClaims);
    }
    Ok(claims)
}
