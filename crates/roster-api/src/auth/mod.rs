//! Authentication and authorization module
//!
//! This module provides JWT-based authentication with the following components:
//! - Token generation and validation
//! - PBKDF2 credential hashing
//! - Middleware for request authentication and role guards
//! - Login service

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use jwt::{generate_access_token, validate_access_token, Claims, JwtConfig, JwtError};
pub use middleware::{auth_middleware, require_any_role, AuthError, AuthenticatedUser};
pub use password::{CredentialHasher, PasswordError};
pub use service::{AuthService, LoginRequest, LoginResponse};
