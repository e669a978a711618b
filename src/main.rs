//! # Secret Volume Plugin
//!
//! Docker volume plugin daemon exposing Azure Key Vault, HashiCorp Vault or
//! Passwordstate secrets as files.
//!
//! ## Usage
//!
//! ```bash
//! # Run the plugin (default)
//! SECRET_BACKEND=vault VAULT_ADDR=https://vault:8200 VAULT_PATH=secret VAULT_TOKEN=... \
//!     secret-volume-plugin serve
//!
//! # Validate configuration and list what would be exposed
//! secret-volume-plugin check
//! ```
//!
//! Configuration is read from the environment, plus `.env` in the working
//! directory when present.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secret_volume_plugin::config::{load_dotenv, BackendConfig, PluginConfig};
use secret_volume_plugin::observability::init_tracing;
use secret_volume_plugin::runtime;
use std::path::Path;

/// Secret volume plugin for Docker
#[derive(Parser)]
#[command(name = "secret-volume-plugin", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the volume plugin API on the Docker plugin socket
    Serve,
    /// Check configuration and backend connectivity, listing exposable secrets
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider before any HTTP client is created
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    // A missing .env file is the normal case; a broken one is fatal
    load_dotenv(Path::new(".env")).context("Failed to load .env")?;

    let cli = Cli::parse();

    let config = PluginConfig::from_env();
    init_tracing(&config);

    let backend_config = BackendConfig::from_env().context("Invalid backend configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => runtime::run(config, backend_config).await,
        Commands::Check => runtime::check(&config, &backend_config).await,
    }
}
