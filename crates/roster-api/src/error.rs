//! API error handling
//!
//! Every failure leaves the API as an [`ErrorResponse`]
//! (`{success: false, message, details?, errors?}`).

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roster_core::RosterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Generic message for 500 responses
pub const INTERNAL_MESSAGE: &str = "A server error occurred.";

/// Field name to messages
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// API error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Human-readable message
    pub message: String,
    /// Internal detail, development environment only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Per-field validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub errors: Option<FieldErrors>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
            errors: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_errors(mut self, errors: FieldErrors) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// Internal error text carried on 500 responses for the details middleware
#[derive(Debug, Clone)]
pub struct InternalErrorDetails(pub String);

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    /// Single-field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut internal = None;

        let body = match self {
            AppError::Validation(errors) => {
                ErrorResponse::new("Validation failed.").with_errors(errors)
            }
            AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => ErrorResponse::new(msg),
            AppError::Unauthorized => ErrorResponse::new("Unauthorized."),
            AppError::Internal(msg) | AppError::Database(msg) => {
                tracing::error!(error = %msg, "Request failed with internal error");
                internal = Some(InternalErrorDetails(msg));
                ErrorResponse::new(INTERNAL_MESSAGE)
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(details) = internal {
            response.extensions_mut().insert(details);
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

impl From<RosterError> for AppError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::NotFound(msg) => AppError::NotFound(msg),
            RosterError::Conflict(msg) => AppError::Conflict(msg),
            RosterError::ValidationError(msg) => AppError::BadRequest(msg),
            RosterError::DatabaseError(msg) => AppError::Database(msg),
            RosterError::ConfigError(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            RosterError::Other(err) => AppError::Internal(format!("{err:#}")),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(field_errors(&errors))
    }
}

/// `new_password` -> `newPassword`
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flatten validator output into the wire field map
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, kind) in errors.errors() {
        let key = camel_case(field);
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = out.entry(key).or_default();
                for error in list {
                    messages.push(
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("The {} field is invalid.", camel_case(field))),
                    );
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                for (nested_key, messages) in field_errors(nested) {
                    out.entry(format!("{key}.{nested_key}"))
                        .or_default()
                        .extend(messages);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    for (nested_key, messages) in field_errors(nested) {
                        out.entry(format!("{key}[{index}].{nested_key}"))
                            .or_default()
                            .extend(messages);
                    }
                }
            }
        }
    }
    out
}
