//! Internal error details for development builds
//!
//! 500 responses carry their cause as an [`InternalErrorDetails`] extension.
//! In development the body is rebuilt with that cause in `details`; in
//! production the generic body is left untouched.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ErrorResponse, InternalErrorDetails, INTERNAL_MESSAGE};
use crate::state::AppState;

pub async fn error_details_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;

    if !state.config.server.environment.is_development() {
        return response;
    }

    let Some(InternalErrorDetails(details)) =
        response.extensions().get::<InternalErrorDetails>().cloned()
    else {
        return response;
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Json(ErrorResponse::new(INTERNAL_MESSAGE).with_details(details));
    (parts, body).into_response()
}
