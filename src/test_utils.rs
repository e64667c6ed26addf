//! Test utilities for Konfigurator
//!
//! This module provides common test utilities including temporary directory
//! management, test file creation, a ready-made login session, and
//! assertion helpers.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::Config;
use crate::error::KonfiguratorError;
use crate::oidc::session::Session;

/// Anti-forgery token used by [`test_session`]
pub const TEST_STATE: &str = "abc123";

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error is a [`KonfiguratorError`] containing the expected message
///
/// # Panics
///
/// Panics if the result is Ok, if the error is not a `KonfiguratorError`,
/// or if the message doesn't contain `expected`
pub fn assert_error_contains<T>(result: crate::error::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            assert!(
                e.downcast_ref::<KonfiguratorError>().is_some(),
                "Error '{}' is not a KonfiguratorError",
                e
            );
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// A session with fixed state bound to an ephemeral loopback port
pub fn test_session() -> Session {
    Session::with_anti_forgery_token(
        TEST_STATE,
        "kube",
        "127.0.0.1:0",
        "/oauth2/callback",
        url::Url::parse("https://id.example.com/authorize").expect("valid URL"),
        url::Url::parse("https://id.example.com/token").expect("valid URL"),
    )
}

/// Create a complete test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
oidc:
  host: https://id.example.com
  client_id: kube
  local_port: 8123
kube:
  api_url: https://k8s.example.com:6443
  namespace: test
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: crate::error::Result<()> =
            Err(KonfiguratorError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_session_state() {
        let session = test_session();
        assert!(session.state_matches(TEST_STATE));
        assert_eq!(session.client_id(), "kube");
    }

    #[test]
    fn test_test_config_yaml_is_valid() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_address(), "localhost:8123");
    }
}
