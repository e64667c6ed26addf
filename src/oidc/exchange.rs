//! Authorization code exchange
//!
//! The callback listener talks to the provider's token endpoint through
//! the [`TokenExchanger`] trait so tests can substitute a stub.  The
//! production implementation, [`HttpTokenExchanger`], performs a standard
//! `authorization_code` grant and extracts the `id_token` from the
//! response.
//!
//! Codes are single-use: a failed exchange is never retried.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{KonfiguratorError, Result};
use crate::oidc::session::Session;

/// A raw OpenID Connect identity token (a compact JWS).
///
/// `Debug` redacts the value so the token never lands in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken {
    raw_value: String,
}

impl IdentityToken {
    pub fn new(raw_value: impl Into<String>) -> Self {
        Self {
            raw_value: raw_value.into(),
        }
    }

    /// The token exactly as issued by the provider.
    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    pub fn into_raw(self) -> String {
        self.raw_value
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("raw_value", &"<redacted>")
            .finish()
    }
}

/// Exchanges an authorization code for an identity token.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Performs the exchange for a single authorization code.
    ///
    /// # Errors
    ///
    /// Returns [`KonfiguratorError::Exchange`] when the provider rejects the
    /// code, the request fails, or the response carries no `id_token`.
    async fn exchange(&self, code: &str) -> Result<IdentityToken>;
}

/// Raw JSON response from the token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

/// [`TokenExchanger`] backed by the provider's token endpoint.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use url::Url;
/// use konfigurator::oidc::exchange::HttpTokenExchanger;
/// use konfigurator::oidc::session::Session;
///
/// let session = Arc::new(Session::new(
///     "my-client",
///     "localhost:8000",
///     "/oauth2/callback",
///     Url::parse("https://id.example.com/authorize").unwrap(),
///     Url::parse("https://id.example.com/token").unwrap(),
/// ));
/// let exchanger = HttpTokenExchanger::new(reqwest::Client::new(), session);
/// ```
pub struct HttpTokenExchanger {
    http: reqwest::Client,
    session: Arc<Session>,
}

impl HttpTokenExchanger {
    /// Creates an exchanger using `http` as transport.
    ///
    /// # Arguments
    ///
    /// * `http` - Client carrying the configured certificate trust.
    /// * `session` - Supplies token endpoint, client id and redirect URI.
    pub fn new(http: reqwest::Client, session: Arc<Session>) -> Self {
        Self { http, session }
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, code: &str) -> Result<IdentityToken> {
        let redirect_uri = self.session.redirect_uri();
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.session.client_id()),
        ];

        let resp = self
            .http
            .post(self.session.token_endpoint().clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| KonfiguratorError::Exchange(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(KonfiguratorError::Exchange(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| KonfiguratorError::Exchange(format!("failed to parse token response: {e}")))?;

        match raw.id_token {
            Some(token) if !token.is_empty() => Ok(IdentityToken::new(token)),
            _ => Err(KonfiguratorError::Exchange(
                "missing id_token from token response".to_string(),
            )
            .into()),
        }
    }
}
