//! appsctl - operator CLI for the client application registry
//!
//! Wires configuration, logging and backend selection, then runs a single
//! registry operation and prints its result as JSON.

use std::process::ExitCode;

use anyhow::Result;
use apps_registry::{build_registry, AppPayload, RegistryError, RegistrySettings, StoreSettings};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "appsctl", version, about = "Manage registered client applications")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(flatten)]
    store: StoreSettings,

    #[command(flatten)]
    registry: RegistrySettings,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one app (without its secret)
    Get { id: String },
    /// List the apps of the calling user
    MyApps {
        #[arg(long)]
        owner: String,
    },
    /// List the apps of any user, secrets included
    UserApps {
        #[arg(long)]
        owner: String,
    },
    /// Register a new app and print its id and secret
    Register {
        #[arg(long)]
        owner: String,
        #[command(flatten)]
        fields: PayloadArgs,
    },
    /// Replace name, description and domain of an app
    Update {
        id: String,
        #[command(flatten)]
        fields: PayloadArgs,
    },
    /// Remove an app
    Delete { id: String },
    /// Issue a new secret, invalidating the old one
    RegenerateSecret { id: String },
    /// Check an id/secret pair
    Verify { id: String, secret: String },
}

#[derive(clap::Args)]
struct PayloadArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    domain: Option<String>,
}

impl From<PayloadArgs> for AppPayload {
    fn from(args: PayloadArgs) -> Self {
        AppPayload {
            name: args.name,
            description: args.description,
            domain: args.domain,
        }
    }
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,apps_registry=debug"));

    // stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn exit_code(err: &RegistryError) -> u8 {
    match err {
        RegistryError::BadRequest(_) => 2,
        RegistryError::NotFound(_) => 3,
        RegistryError::Internal(_) => 1,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    debug!(backend = ?cli.store.backend, "Starting appsctl");

    let registry = match build_registry(&cli.store, &cli.registry).await {
        Ok(registry) => registry,
        Err(e) => {
            error!("Failed to initialize registry: {:#}", e);
            return Err(e);
        }
    };

    let outcome = match cli.cmd {
        Commands::Get { id } => match registry.get_app(&id).await {
            Ok(app) => print_json(&app),
            Err(e) => return Ok(report(e)),
        },
        Commands::MyApps { owner } => match registry.get_my_apps(&owner).await {
            Ok(apps) => print_json(&apps),
            Err(e) => return Ok(report(e)),
        },
        Commands::UserApps { owner } => match registry.get_user_apps(&owner).await {
            Ok(apps) => print_json(&apps),
            Err(e) => return Ok(report(e)),
        },
        Commands::Register { owner, fields } => {
            match registry.register_app(fields.into(), &owner).await {
                Ok(registered) => print_json(&registered),
                Err(e) => return Ok(report(e)),
            }
        }
        Commands::Update { id, fields } => match registry.update_app(fields.into(), &id).await {
            Ok(app) => print_json(&app),
            Err(e) => return Ok(report(e)),
        },
        Commands::Delete { id } => match registry.delete_app(&id).await {
            Ok(()) => print_json(&serde_json::json!({ "deleted": id })),
            Err(e) => return Ok(report(e)),
        },
        Commands::RegenerateSecret { id } => match registry.regenerate_secret(&id).await {
            Ok(app) => print_json(&app),
            Err(e) => return Ok(report(e)),
        },
        Commands::Verify { id, secret } => match registry.verify_app(&id, &secret).await {
            Ok(app) => print_json(&app),
            Err(e) => return Ok(report(e)),
        },
    };

    outcome?;
    Ok(ExitCode::SUCCESS)
}

fn report(err: RegistryError) -> ExitCode {
    eprintln!("Error ({}): {}", err.status_code(), err.message());
    ExitCode::from(exit_code(&err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_register_flags_build_payload() {
        let cli = Cli::try_parse_from([
            "appsctl",
            "register",
            "--owner",
            "u1",
            "--name",
            "my-app",
            "--domain",
            "example.com",
        ])
        .unwrap();

        match cli.cmd {
            Commands::Register { owner, fields } => {
                assert_eq!(owner, "u1");
                let payload = AppPayload::from(fields);
                assert_eq!(payload, AppPayload::new("my-app").with_domain("example.com"));
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_exit_codes_follow_outcome() {
        assert_eq!(exit_code(&RegistryError::BadRequest("x".into())), 2);
        assert_eq!(exit_code(&RegistryError::NotFound("x".into())), 3);
        assert_eq!(exit_code(&RegistryError::Internal("x".into())), 1);
    }
}
