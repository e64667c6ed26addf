//! Authorization URL construction
//!
//! Builds the provider URL the root route redirects the browser to.  The
//! response type and scope are fixed to the identity-token flow with the
//! minimal `openid` scope.

use base64::Engine as _;
use url::Url;

use crate::oidc::session::Session;

/// `response_type` requested from the provider.
pub const RESPONSE_TYPE: &str = "id_token";

/// `scope` requested from the provider.
pub const SCOPE: &str = "openid";

/// Generates a single-use nonce: 32 random bytes as base64url without
/// padding.
pub fn generate_nonce() -> String {
    use rand::RngCore as _;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the authorization URL for `session`, carrying `state` as the
/// anti-forgery value.
///
/// Every call generates a fresh nonce, so two calls never return the same
/// URL.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use konfigurator::oidc::authorize::build_authorization_url;
/// use konfigurator::oidc::session::Session;
///
/// let session = Session::with_anti_forgery_token(
///     "abc123",
///     "my-client",
///     "localhost:8000",
///     "/oauth2/callback",
///     Url::parse("https://id.example.com/authorize").unwrap(),
///     Url::parse("https://id.example.com/token").unwrap(),
/// );
///
/// let url = build_authorization_url(&session, session.anti_forgery_token());
/// assert!(url.as_str().starts_with("https://id.example.com/authorize?client_id=my-client"));
/// assert!(url.as_str().ends_with("state=abc123"));
/// ```
pub fn build_authorization_url(session: &Session, state: &str) -> Url {
    let mut url = session.authorization_endpoint().clone();
    let nonce = generate_nonce();

    url.query_pairs_mut()
        .append_pair("client_id", session.client_id())
        .append_pair("nonce", &nonce)
        .append_pair("redirect_uri", &session.redirect_uri())
        .append_pair("response_type", RESPONSE_TYPE)
        .append_pair("scope", SCOPE)
        .append_pair("state", state);

    url
}
