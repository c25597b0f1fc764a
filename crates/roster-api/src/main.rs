//! Roster API Server
//!
//! REST API server for user administration.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use roster_api::{auth::CredentialHasher, create_router, seed, state::AppState};
use roster_core::config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "roster_api={level},roster_core={level},audit=info,tower_http=info",
            level = logging.level
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("ROSTER_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {path}"))?
            .with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let seed_demo_users = config.database.seed_demo_users;
    let hasher = CredentialHasher::from(&config.credentials);

    let state = Arc::new(
        AppState::build(config)
            .await
            .context("Failed to initialise application state")?,
    );

    if seed_demo_users {
        seed::seed_demo_users(state.users.store().as_ref(), hasher)
            .await
            .context("Demo seeding failed")?;
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Roster API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
