//! Konfigurator - kubeconfig generation through OpenID Connect
//!
//! Main entry point for the Konfigurator command-line tool.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use konfigurator::cli::{Cli, Commands};
use konfigurator::commands;
use konfigurator::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("konfigurator.yaml");
    let config = Config::load(config_path, &cli)?;

    match cli.command {
        Commands::Generate(_) => {
            config.validate()?;
            tracing::info!("Starting OpenID Connect login");
            commands::generate::run_generate(config).await?;
            Ok(())
        }
        Commands::Discover { .. } => {
            config.validate_issuer()?;
            tracing::info!("Discovering provider endpoints");
            commands::discover::run_discover(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr; stdout carries the kubeconfig.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "konfigurator=debug"
    } else {
        "konfigurator=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
