//! Localization handler

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppError;
use crate::localization::Dictionary;
use crate::state::AppState;

/// Flat UI dictionary for a language
///
/// `ar` returns Arabic, anything else English. A missing file yields `{}`.
#[utoipa::path(
    get,
    path = "/api/v1/localization/{lang}",
    tag = "localization",
    params(("lang" = String, Path, description = "Language code, en or ar")),
    responses(
        (status = 200, description = "Key to text map", body = std::collections::BTreeMap<String, String>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_strings(
    State(state): State<Arc<AppState>>,
    Path(lang): Path<String>,
) -> Result<Json<Dictionary>, AppError> {
    Ok(Json(state.localization.strings(&lang).await?))
}
