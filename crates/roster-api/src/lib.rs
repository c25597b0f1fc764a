//! Roster API - user administration REST server
//!
//! Provides account CRUD with soft delete, JWT login, an audited read and
//! write trail, and UI localization dictionaries.

pub mod audit;
pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod localization;
pub mod middleware;
pub mod routes;
pub mod seed;
pub mod state;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderValue, middleware as axum_mw, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{auth as auth_handlers, health, localization as l10n_handlers, users as user_handlers};
use crate::middleware::{error_details_middleware, metrics_middleware, security_headers_middleware};
use crate::state::AppState;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Roster API",
        version = "1.0",
        description = "User administration API"
    ),
    paths(
        health::health_check,
        health::readiness_check,
        health::ping,
        auth_handlers::login_handler,
        user_handlers::list_users,
        user_handlers::grid_users,
        user_handlers::get_user,
        user_handlers::create_user,
        user_handlers::update_user,
        user_handlers::delete_user,
        user_handlers::get_profile,
        user_handlers::update_profile,
        l10n_handlers::get_strings,
    ),
    components(schemas(
        error::ErrorResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::PingResponse,
        auth::LoginRequest,
        auth::LoginResponse,
        users::UserPublic,
        users::CreateUserRequest,
        users::UpdateUserRequest,
        users::UpdateProfileRequest,
        users::UserListResponse,
        users::GridRequest,
        users::GridResponse,
        users::models::GridSearch,
        users::models::GridOrder,
        users::models::GridColumn,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "auth", description = "Login"),
        (name = "users", description = "Account administration"),
        (name = "localization", description = "UI dictionaries"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            error_details_middleware,
        ))
        .layer(axum_mw::from_fn_with_state(state.clone(), metrics_middleware))
        .layer(axum_mw::from_fn(security_headers_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application state for tests: in-memory store, cheap hashing
#[cfg(any(test, feature = "test-utils"))]
pub fn create_state_for_testing() -> Arc<AppState> {
    let mut config = roster_core::AppConfig::default();
    config.database.backend = roster_core::StorageBackend::Memory;
    config.credentials.pbkdf2_iterations = 1_000;
    Arc::new(AppState::in_memory(config))
}

/// Router over a fresh in-memory state
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(create_state_for_testing())
}
