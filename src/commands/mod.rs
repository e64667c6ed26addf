//! Command handlers for Konfigurator
//!
//! Each handler takes the loaded configuration, wires the production
//! collaborators together and runs the command.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::oidc::discovery::{fetch_provider_metadata, parse_issuer, ProviderMetadata};
use crate::oidc::transport::{build_http_client, TlsSettings};

/// Builds the outbound client and discovers the provider endpoints.
///
/// Both steps are setup: a failure here aborts before any listener starts.
async fn discover_provider(config: &Config) -> Result<(reqwest::Client, ProviderMetadata)> {
    let issuer = parse_issuer(&config.oidc.host)?;
    let http = build_http_client(&TlsSettings::from_env())?;
    let metadata = fetch_provider_metadata(&http, &issuer).await?;
    Ok((http, metadata))
}

// Login and kubeconfig generation
pub mod generate {
    //! Full login: discovery, callback listener, browser, kubeconfig.

    use super::*;
    use crate::browser::{BrowserLauncher, NoBrowser, SystemBrowser};
    use crate::error::KonfiguratorError;
    use crate::kubeconfig::KubeConfigWriter;
    use crate::oidc::exchange::HttpTokenExchanger;
    use crate::oidc::session::Session;
    use crate::orchestrator::Orchestrator;

    /// Run the login and write the kubeconfig
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration (consumed)
    ///
    /// # Errors
    ///
    /// Returns setup errors before the listener starts, emission errors,
    /// and [`KonfiguratorError::ShutdownTimeout`] if the listener fails to
    /// stop after the kubeconfig was written.
    pub async fn run_generate(config: Config) -> Result<()> {
        let writer = KubeConfigWriter::new(config.cluster_params(), config.output_target())?;
        let (http, metadata) = super::discover_provider(&config).await?;

        let session = Arc::new(Session::from_metadata(
            &metadata,
            config.oidc.client_id.clone(),
            config.listen_address(),
            config.oidc.callback_path.clone(),
        ));
        let exchanger = Arc::new(HttpTokenExchanger::new(http, Arc::clone(&session)));
        let browser: Arc<dyn BrowserLauncher> = if config.oidc.open_browser {
            Arc::new(SystemBrowser)
        } else {
            Arc::new(NoBrowser)
        };

        let orchestrator = Orchestrator::new(session, exchanger, browser)
            .with_emitter(Arc::new(writer))
            .with_options(config.orchestrator_options());

        match orchestrator.run().await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(KonfiguratorError::ShutdownTimeout(grace)) =
                    e.downcast_ref::<KonfiguratorError>()
                {
                    tracing::warn!(
                        "Kubeconfig was written but the listener did not stop within {:?}",
                        grace
                    );
                }
                Err(e)
            }
        }
    }
}

// Provider discovery
pub mod discover {
    //! Prints the discovered provider metadata.

    use super::*;

    /// Discover the provider and print its metadata as pretty JSON to stdout
    pub async fn run_discover(config: Config) -> Result<()> {
        let (_, metadata) = super::discover_provider(&config).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        Ok(())
    }
}
