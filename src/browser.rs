//! Browser launch
//!
//! Opening the browser is best-effort: when it fails the URL is printed to
//! stderr so the user can navigate manually.  The listener keeps running
//! either way.

use crate::error::{KonfiguratorError, Result};

/// Opens a URL in the user's browser.
pub trait BrowserLauncher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`KonfiguratorError::Browser`] if no browser could be started.
    fn open(&self, url: &str) -> Result<()>;
}

/// [`BrowserLauncher`] using the platform default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        webbrowser::open(url)
            .map_err(|e| KonfiguratorError::Browser(format!("failed to open {url}: {e}")).into())
    }
}

/// [`BrowserLauncher`] that never opens anything, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> Result<()> {
        Err(KonfiguratorError::Browser("browser launch disabled".to_string()).into())
    }
}

/// Tries `launcher` and falls back to printing the URL to stderr.
///
/// Returns `true` if the browser was opened.
pub fn open_or_print(launcher: &dyn BrowserLauncher, url: &str) -> bool {
    match launcher.open(url) {
        Ok(()) => {
            tracing::debug!(url, "Opened browser");
            true
        }
        Err(e) => {
            tracing::debug!("{:#}", e);
            eprintln!("Go to the following url to authenticate: {url}");
            false
        }
    }
}
