//! OpenID Connect provider discovery
//!
//! Locates the provider's authorization and token endpoints from its
//! OpenID Connect Discovery 1.0 document before the login starts.
//!
//! # Discovery sequence
//!
//! 1. `<issuer>/.well-known/openid-configuration` (path appending, the form
//!    mandated by OpenID Connect Discovery).
//! 2. `<origin>/.well-known/openid-configuration` (root, used by providers
//!    that ignore the issuer path).
//!
//! The first candidate that answers with a parseable document wins.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{KonfiguratorError, Result};

/// Provider metadata document (OpenID Connect Discovery 1.0).
///
/// Only the fields the login needs are modelled; everything else is kept
/// in [`Self::extra`].
///
/// # Examples
///
/// ```
/// use konfigurator::oidc::discovery::ProviderMetadata;
///
/// let json = r#"{
///     "issuer": "https://id.example.com",
///     "authorization_endpoint": "https://id.example.com/authorize",
///     "token_endpoint": "https://id.example.com/token"
/// }"#;
///
/// let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.token_endpoint.as_str(), "https://id.example.com/token");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// The issuer identifier URI for this provider.
    pub issuer: String,

    /// The URL of the authorization endpoint.
    pub authorization_endpoint: Url,

    /// The URL of the token endpoint.
    pub token_endpoint: Url,

    /// List of `response_type` values the provider supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// List of OAuth scopes the provider supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Additional metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Parses the configured issuer, defaulting to `https://` when the value
/// is a bare host.
///
/// # Errors
///
/// Returns [`KonfiguratorError::Setup`] if the value is empty or not a URL.
pub fn parse_issuer(issuer: &str) -> Result<Url> {
    let trimmed = issuer.trim();
    if trimmed.is_empty() {
        return Err(KonfiguratorError::Setup("issuer host is empty".to_string()).into());
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    Url::parse(&candidate)
        .map_err(|e| KonfiguratorError::Setup(format!("invalid issuer {issuer}: {e}")).into())
}

/// Builds the well-known URLs tried for `issuer`, in order.
fn build_candidate_urls(issuer: &Url) -> Vec<Url> {
    let path = issuer.path().trim_end_matches('/').to_string();
    let mut candidates = Vec::with_capacity(2);

    let mut appended = issuer.clone();
    appended.set_path(&format!("{}/.well-known/openid-configuration", path));
    appended.set_query(None);
    appended.set_fragment(None);
    candidates.push(appended);

    if !path.is_empty() {
        let mut root = issuer.clone();
        root.set_path("/.well-known/openid-configuration");
        root.set_query(None);
        root.set_fragment(None);
        candidates.push(root);
    }

    candidates
}

/// Fetches the provider metadata document for `issuer`.
///
/// # Arguments
///
/// * `http` - Client built by [`build_http_client`](super::transport::build_http_client).
/// * `issuer` - The provider issuer URL.
///
/// # Errors
///
/// Returns [`KonfiguratorError::Discovery`] if no candidate yields a valid
/// document.
///
/// # Examples
///
/// ```no_run
/// use url::Url;
/// use konfigurator::oidc::discovery::fetch_provider_metadata;
///
/// # async fn example() -> konfigurator::error::Result<()> {
/// let http = reqwest::Client::new();
/// let issuer = Url::parse("https://id.example.com")?;
/// let meta = fetch_provider_metadata(&http, &issuer).await?;
/// println!("token endpoint: {}", meta.token_endpoint);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    issuer: &Url,
) -> Result<ProviderMetadata> {
    for candidate in build_candidate_urls(issuer) {
        tracing::debug!(url = %candidate, "Trying provider discovery document");

        let resp = match http.get(candidate.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url = %candidate, error = %e, "Discovery request failed");
                continue;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!(url = %candidate, status = %resp.status(), "Discovery candidate rejected");
            continue;
        }

        match resp.json::<ProviderMetadata>().await {
            Ok(meta) => {
                tracing::info!(issuer = %meta.issuer, "Discovered provider endpoints");
                return Ok(meta);
            }
            Err(e) => {
                tracing::debug!(url = %candidate, error = %e, "Discovery document unparseable");
            }
        }
    }

    Err(KonfiguratorError::Discovery(format!(
        "provider metadata not found for issuer {}",
        issuer
    ))
    .into())
}
