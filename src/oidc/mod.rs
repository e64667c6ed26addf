//! OpenID Connect client side of the login
//!
//! # Module Layout
//!
//! - [`discovery`] -- provider metadata (OpenID Connect Discovery 1.0)
//! - [`session`]   -- immutable per-login state and anti-forgery token
//! - [`authorize`] -- authorization URL construction
//! - [`exchange`]  -- authorization code to identity token exchange
//! - [`transport`] -- outbound HTTP client with custom CA trust

pub mod authorize;
pub mod discovery;
pub mod exchange;
pub mod session;
pub mod transport;

pub use exchange::{HttpTokenExchanger, IdentityToken, TokenExchanger};
pub use session::Session;
