//! API route definitions

use crate::auth::middleware::{auth_middleware, require_any_role};
use crate::handlers::{auth, health, localization, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use roster_core::UserRole;
use std::sync::Arc;

const ADMIN: &[UserRole] = &[UserRole::Admin];
const READERS: &[UserRole] = &[UserRole::Admin, UserRole::ReadOnlyUser];

/// Create API v1 routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new().route("/auth/login", post(auth::login_handler));

    // Account mutation
    let admin_routes = Router::new()
        .route("/users", post(users::create_user))
        .route(
            "/users/:id",
            put(users::update_user).delete(users::delete_user),
        )
        .route_layer(middleware::from_fn(require_any_role(ADMIN)));

    // Account reads
    let reader_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user))
        .route_layer(middleware::from_fn(require_any_role(READERS)));

    // Any authenticated role
    let member_routes = Router::new()
        .route("/users/dt", post(users::grid_users))
        .route(
            "/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/localization/:lang", get(localization::get_strings))
        .route("/health/ping", get(health::ping));

    let protected_routes = Router::new()
        .merge(admin_routes)
        .merge(reader_routes)
        .merge(member_routes)
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
