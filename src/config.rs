//! Configuration management for Konfigurator
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from a YAML file, environment variables, and CLI
//! overrides, applied in that order.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KonfiguratorError, Result};
use crate::kubeconfig::{ClusterParams, OutputTarget};
use crate::orchestrator::OrchestratorOptions;

/// Main configuration structure for Konfigurator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OpenID Connect login settings
    #[serde(default)]
    pub oidc: OidcConfig,

    /// Target cluster settings
    #[serde(default)]
    pub kube: KubeSettings,

    /// Kubeconfig destination; stdout when unset
    #[serde(default)]
    pub output: Option<String>,
}

/// OpenID Connect login settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Issuer URL or bare host of the identity provider
    #[serde(default)]
    pub host: String,

    /// Client identifier registered with the provider
    #[serde(default)]
    pub client_id: String,

    /// Host name the callback listener binds to and the redirect URI uses
    #[serde(default = "default_local_host")]
    pub local_host: String,

    /// Local port for the callback listener
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Path of the callback route
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// Give up waiting for the login after this many seconds (unset waits forever)
    #[serde(default)]
    pub login_timeout_seconds: Option<u64>,

    /// Time allowed for the listener to stop after the login
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    /// Open the system browser automatically
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_local_host() -> String {
    "localhost".to_string()
}

fn default_local_port() -> u16 {
    8000
}

fn default_callback_path() -> String {
    "/oauth2/callback".to_string()
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

fn default_open_browser() -> bool {
    true
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            client_id: String::new(),
            local_host: default_local_host(),
            local_port: default_local_port(),
            callback_path: default_callback_path(),
            login_timeout_seconds: None,
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            open_browser: default_open_browser(),
        }
    }
}

/// Target cluster settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeSettings {
    /// Cluster CA: path to a PEM file or base64-encoded data
    #[serde(default)]
    pub ca: String,

    /// Cluster API server URL
    #[serde(default)]
    pub api_url: String,

    /// Namespace of the generated context
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            ca: String::new(),
            api_url: String::new(),
            namespace: default_namespace(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KonfiguratorError::Config(format!("Failed to read config file: {}", e))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| KonfiguratorError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("KONFIGURATOR_OIDC_HOST") {
            self.oidc.host = host;
        }

        if let Ok(client_id) = std::env::var("KONFIGURATOR_CLIENT_ID") {
            self.oidc.client_id = client_id;
        }

        if let Ok(local_host) = std::env::var("KONFIGURATOR_LOCAL_HOST") {
            self.oidc.local_host = local_host;
        }

        if let Ok(port) = std::env::var("KONFIGURATOR_LOCAL_PORT") {
            if let Ok(value) = port.parse() {
                self.oidc.local_port = value;
            } else {
                tracing::warn!("Invalid KONFIGURATOR_LOCAL_PORT: {}", port);
            }
        }

        if let Ok(path) = std::env::var("KONFIGURATOR_CALLBACK_PATH") {
            self.oidc.callback_path = path;
        }

        if let Ok(timeout) = std::env::var("KONFIGURATOR_LOGIN_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.oidc.login_timeout_seconds = Some(value);
            } else {
                tracing::warn!("Invalid KONFIGURATOR_LOGIN_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(grace) = std::env::var("KONFIGURATOR_SHUTDOWN_GRACE_SECONDS") {
            if let Ok(value) = grace.parse() {
                self.oidc.shutdown_grace_seconds = value;
            } else {
                tracing::warn!("Invalid KONFIGURATOR_SHUTDOWN_GRACE_SECONDS: {}", grace);
            }
        }

        if let Ok(ca) = std::env::var("KONFIGURATOR_KUBE_CA") {
            self.kube.ca = ca;
        }

        if let Ok(api_url) = std::env::var("KONFIGURATOR_KUBE_API_URL") {
            self.kube.api_url = api_url;
        }

        if let Ok(namespace) = std::env::var("KONFIGURATOR_KUBE_NAMESPACE") {
            self.kube.namespace = namespace;
        }

        if let Ok(output) = std::env::var("KONFIGURATOR_OUTPUT") {
            self.output = Some(output);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        use crate::cli::Commands;

        match &cli.command {
            Commands::Generate(args) => {
                if let Some(host) = &args.host {
                    self.oidc.host = host.clone();
                }
                if let Some(client_id) = &args.client_id {
                    self.oidc.client_id = client_id.clone();
                }
                if let Some(port) = args.port {
                    self.oidc.local_port = port;
                }
                if let Some(path) = &args.callback_path {
                    self.oidc.callback_path = path.clone();
                }
                if let Some(timeout) = args.login_timeout {
                    self.oidc.login_timeout_seconds = Some(timeout);
                }
                if args.no_browser {
                    self.oidc.open_browser = false;
                }
                if let Some(ca) = &args.kube_ca {
                    self.kube.ca = ca.clone();
                }
                if let Some(api_url) = &args.kube_api_url {
                    self.kube.api_url = api_url.clone();
                }
                if let Some(namespace) = &args.namespace {
                    self.kube.namespace = namespace.clone();
                }
                if let Some(output) = &args.output {
                    self.output = Some(output.clone());
                }
            }
            Commands::Discover { host } => {
                if let Some(host) = host {
                    self.oidc.host = host.clone();
                }
            }
        }
    }

    /// Validate the settings discovery needs
    ///
    /// # Errors
    ///
    /// Returns error if the issuer host is missing
    pub fn validate_issuer(&self) -> Result<()> {
        if self.oidc.host.trim().is_empty() {
            return Err(KonfiguratorError::Config("oidc.host cannot be empty".to_string()).into());
        }
        Ok(())
    }

    /// Validate the configuration for a full login
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        self.validate_issuer()?;

        if self.oidc.client_id.trim().is_empty() {
            return Err(
                KonfiguratorError::Config("oidc.client_id cannot be empty".to_string()).into(),
            );
        }

        if self.oidc.local_host.trim().is_empty() {
            return Err(
                KonfiguratorError::Config("oidc.local_host cannot be empty".to_string()).into(),
            );
        }

        if self.oidc.local_port == 0 {
            return Err(KonfiguratorError::Config(
                "oidc.local_port must be greater than 0".to_string(),
            )
            .into());
        }

        let path = self.oidc.callback_path.as_str();
        if !path.starts_with('/') || path == "/" || path == "/favicon.ico" {
            return Err(KonfiguratorError::Config(format!(
                "oidc.callback_path must be an absolute path other than / and /favicon.ico, got {:?}",
                path
            ))
            .into());
        }

        if self.oidc.login_timeout_seconds == Some(0) {
            return Err(KonfiguratorError::Config(
                "oidc.login_timeout_seconds must be greater than 0 when set".to_string(),
            )
            .into());
        }

        if self.oidc.shutdown_grace_seconds == 0 {
            return Err(KonfiguratorError::Config(
                "oidc.shutdown_grace_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.kube.api_url.trim().is_empty() {
            return Err(
                KonfiguratorError::Config("kube.api_url cannot be empty".to_string()).into(),
            );
        }

        url::Url::parse(&self.kube.api_url).map_err(|e| {
            KonfiguratorError::Config(format!("kube.api_url is not a valid URL: {}", e))
        })?;

        Ok(())
    }

    /// `host:port` the callback listener binds to
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.oidc.local_host, self.oidc.local_port)
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            shutdown_grace: Duration::from_secs(self.oidc.shutdown_grace_seconds),
            login_timeout: self.oidc.login_timeout_seconds.map(Duration::from_secs),
        }
    }

    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            ca: self.kube.ca.clone(),
            api_url: self.kube.api_url.clone(),
            namespace: self.kube.namespace.clone(),
        }
    }

    pub fn output_target(&self) -> OutputTarget {
        OutputTarget::from_option(self.output.as_deref())
    }
}
