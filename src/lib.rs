//! Konfigurator - kubeconfig generation through OpenID Connect
//!
//! This library performs a browser-mediated OpenID Connect login against a
//! local callback listener and turns the resulting identity token into a
//! kubeconfig.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `oidc`: Provider discovery, session state, authorization URL, token exchange, transport
//! - `callback`: Local callback listener and its exactly-once completion gate
//! - `orchestrator`: Drives one login from listener start to shutdown
//! - `browser`: Browser launch with stderr fallback
//! - `kubeconfig`: Credential emission
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use konfigurator::browser::SystemBrowser;
//! use konfigurator::oidc::discovery::{fetch_provider_metadata, parse_issuer};
//! use konfigurator::oidc::{HttpTokenExchanger, Session};
//! use konfigurator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http = reqwest::Client::new();
//!     let metadata = fetch_provider_metadata(&http, &parse_issuer("id.example.com")?).await?;
//!     let session = Arc::new(Session::from_metadata(
//!         &metadata,
//!         "kube",
//!         "localhost:8000",
//!         "/oauth2/callback",
//!     ));
//!     let exchanger = Arc::new(HttpTokenExchanger::new(http, session.clone()));
//!
//!     let token = Orchestrator::new(session, exchanger, Arc::new(SystemBrowser))
//!         .run()
//!         .await?;
//!     println!("{}", token.raw_value());
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod callback;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod kubeconfig;
pub mod oidc;
pub mod orchestrator;

// Re-export commonly used types
pub use callback::{CallbackListener, CompletionGate};
pub use config::Config;
pub use error::{KonfiguratorError, Result};
pub use oidc::{IdentityToken, Session, TokenExchanger};
pub use orchestrator::{Orchestrator, OrchestratorOptions};

#[cfg(test)]
pub mod test_utils;
