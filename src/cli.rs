//! Command-line interface definition for Konfigurator
//!
//! This module defines the CLI structure using clap's derive API.  Every
//! flag is optional: unset flags fall back to the configuration file and
//! `KONFIGURATOR_*` environment variables.

use clap::{Args, Parser, Subcommand};

/// Konfigurator - kubeconfig generation through OpenID Connect
///
/// Starts a local web server to receive the OpenID Connect callback, opens
/// the browser for the login and writes a kubeconfig carrying the
/// retrieved identity token.
#[derive(Parser, Debug, Clone)]
#[command(name = "konfigurator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "konfigurator.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Konfigurator
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in through the browser and write a kubeconfig
    Generate(GenerateArgs),

    /// Print the identity provider's discovered endpoints as JSON
    Discover {
        /// Issuer URL or host of the identity provider
        #[arg(long)]
        host: Option<String>,
    },
}

/// Flags of the `generate` command
#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Issuer URL or host of the identity provider
    #[arg(long)]
    pub host: Option<String>,

    /// OIDC client identifier
    #[arg(long)]
    pub client_id: Option<String>,

    /// Local port for the callback listener
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path of the local callback route
    #[arg(short = 'e', long)]
    pub callback_path: Option<String>,

    /// Cluster CA: path to a PEM file or base64-encoded data
    #[arg(long)]
    pub kube_ca: Option<String>,

    /// Cluster API server URL
    #[arg(short = 'u', long)]
    pub kube_api_url: Option<String>,

    /// Namespace of the generated context
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Write the kubeconfig to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Give up if no login completes within this many seconds
    #[arg(long)]
    pub login_timeout: Option<u64>,

    /// Only print the login URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
