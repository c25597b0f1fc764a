//! Roster CLI - Command-line administration
//!
//! Usage:
//!   roster migrate
//!   roster seed
//!   roster create-user --username <name> --email <email> --password <pw> --role <role>
//!   roster hash-password <password>

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use roster_api::audit::RequestContext;
use roster_api::auth::CredentialHasher;
use roster_api::seed::seed_demo_users;
use roster_api::state::AppState;
use roster_api::users::CreateUserRequest;
use roster_core::{AppConfig, PgStore, StorageBackend, UserRole};
use validator::Validate;

/// Performer recorded for accounts created from the command line
const CLI_ACTOR: &str = "cli";

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Roster user administration CLI")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true, env = "ROSTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Insert the demo accounts
    Seed,
    /// Create an account (audited as "cli")
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Admin, User or ReadOnlyUser
        #[arg(long, default_value = "User")]
        role: UserRole,
    },
    /// Print the stored form of a password
    HashPassword {
        password: String,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roster=info,roster_api=info,roster_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config)?;

    match cli.command {
        Commands::Migrate => {
            if config.database.backend != StorageBackend::Postgres {
                bail!("migrate requires the postgres storage backend");
            }
            let store = PgStore::connect(&config.database).await?;
            store.migrate().await?;
            println!("Migrations applied");
        }
        Commands::Seed => {
            let hasher = CredentialHasher::from(&config.credentials);
            let state = AppState::build(config).await?;
            let created = seed_demo_users(state.users.store().as_ref(), hasher)
                .await
                .context("Seeding failed")?;
            println!("Seeded {created} demo accounts");
        }
        Commands::CreateUser {
            username,
            email,
            password,
            role,
        } => {
            let request = CreateUserRequest {
                username: username.trim().to_string(),
                email,
                password,
                role,
            };
            if let Err(errors) = request.validate() {
                let fields = roster_api::error::field_errors(&errors);
                bail!("Invalid account: {}", serde_json::to_string(&fields)?);
            }

            // Migrations are the job of `roster migrate`
            config.database.run_migrations = false;
            let state = AppState::build(config).await?;
            let user = state
                .users
                .create(request, &RequestContext::new(CLI_ACTOR, None))
                .await
                .context("Failed to create account")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::HashPassword { password } => {
            let hash = CredentialHasher::from(&config.credentials).hash(&password)?;
            println!("{hash}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_user() {
        let cli = Cli::try_parse_from([
            "roster",
            "create-user",
            "--username",
            "alice",
            "--email",
            "alice@x.com",
            "--password",
            "Passw0rd!",
            "--role",
            "readonlyuser",
        ])
        .unwrap();

        match cli.command {
            Commands::CreateUser { username, role, .. } => {
                assert_eq!(username, "alice");
                assert_eq!(role, UserRole::ReadOnlyUser);
            }
            _ => panic!("expected create-user"),
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = Cli::try_parse_from([
            "roster",
            "create-user",
            "--username",
            "alice",
            "--email",
            "alice@x.com",
            "--password",
            "Passw0rd!",
            "--role",
            "Owner",
        ]);
        assert!(result.is_err());
    }
}
