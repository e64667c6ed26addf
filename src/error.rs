//! Error types for Konfigurator
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Konfigurator operations
///
/// Covers configuration loading, provider discovery, the callback
/// listener lifecycle, token exchange and kubeconfig emission.
#[derive(Error, Debug)]
pub enum KonfiguratorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Setup failures before the listener starts serving (discovery,
    /// transport construction, socket bind)
    #[error("Setup error: {0}")]
    Setup(String),

    /// Provider metadata discovery errors
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Callback `state` did not match the session's anti-forgery token
    #[error("Callback validation failed: {0}")]
    CallbackValidation(String),

    /// Authorization code exchange errors
    #[error("Token exchange error: {0}")]
    Exchange(String),

    /// The listener did not stop within the grace period
    #[error("Listener did not shut down within {0:?}")]
    ShutdownTimeout(Duration),

    /// No successful callback arrived within the configured login timeout
    #[error("No successful login within {0:?}")]
    LoginTimeout(Duration),

    /// Browser launch errors
    #[error("Browser error: {0}")]
    Browser(String),

    /// Credential (kubeconfig) generation errors
    #[error("Credential error: {0}")]
    Credential(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Konfigurator operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
