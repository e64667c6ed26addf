//! Login session data shared by the listener, URL builder and exchanger
//!
//! A [`Session`] is built once per invocation, before the callback listener
//! starts, and is never mutated afterwards.  It is shared as
//! `Arc<Session>` so route handlers can read it concurrently without
//! locking.

use url::Url;

use crate::oidc::discovery::ProviderMetadata;

/// Immutable state of one browser login.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use konfigurator::oidc::session::Session;
///
/// let session = Session::new(
///     "my-client",
///     "localhost:8000",
///     "/oauth2/callback",
///     Url::parse("https://id.example.com/authorize").unwrap(),
///     Url::parse("https://id.example.com/token").unwrap(),
/// );
///
/// assert_eq!(session.redirect_uri(), "http://localhost:8000/oauth2/callback");
/// assert!(!session.anti_forgery_token().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    anti_forgery_token: String,
    client_id: String,
    listen_address: String,
    callback_path: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
}

impl Session {
    /// Creates a session with a freshly generated UUID v4 anti-forgery token.
    ///
    /// # Arguments
    ///
    /// * `client_id` - OIDC client identifier registered with the provider.
    /// * `listen_address` - Local `host:port` the callback listener binds to.
    /// * `callback_path` - Path of the callback route, e.g. `/oauth2/callback`.
    /// * `authorization_endpoint` - Provider authorization endpoint.
    /// * `token_endpoint` - Provider token endpoint.
    pub fn new(
        client_id: impl Into<String>,
        listen_address: impl Into<String>,
        callback_path: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
    ) -> Self {
        Self::with_anti_forgery_token(
            uuid::Uuid::new_v4().to_string(),
            client_id,
            listen_address,
            callback_path,
            authorization_endpoint,
            token_endpoint,
        )
    }

    /// Creates a session with a caller-supplied anti-forgery token.
    pub fn with_anti_forgery_token(
        anti_forgery_token: impl Into<String>,
        client_id: impl Into<String>,
        listen_address: impl Into<String>,
        callback_path: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
    ) -> Self {
        Self {
            anti_forgery_token: anti_forgery_token.into(),
            client_id: client_id.into(),
            listen_address: listen_address.into(),
            callback_path: normalize_path(callback_path.into()),
            authorization_endpoint,
            token_endpoint,
        }
    }

    /// Creates a session from discovered provider metadata.
    pub fn from_metadata(
        metadata: &ProviderMetadata,
        client_id: impl Into<String>,
        listen_address: impl Into<String>,
        callback_path: impl Into<String>,
    ) -> Self {
        Self::new(
            client_id,
            listen_address,
            callback_path,
            metadata.authorization_endpoint.clone(),
            metadata.token_endpoint.clone(),
        )
    }

    /// The opaque value round-tripped through the provider as `state`.
    pub fn anti_forgery_token(&self) -> &str {
        &self.anti_forgery_token
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn listen_address(&self) -> &str {
        &self.listen_address
    }

    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    pub fn authorization_endpoint(&self) -> &Url {
        &self.authorization_endpoint
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    /// The redirect URI registered with the provider:
    /// `http://<listen_address><callback_path>`.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}{}", self.listen_address, self.callback_path)
    }

    /// Whether `received` equals the anti-forgery token.
    pub fn state_matches(&self, received: &str) -> bool {
        !self.anti_forgery_token.is_empty() && received == self.anti_forgery_token
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}
