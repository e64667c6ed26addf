//! Login orchestration
//!
//! [`Orchestrator::run`] drives one complete login:
//!
//! 1. Bind and start the [`CallbackListener`] on the session address.
//! 2. Point the browser at the listener root (or print the URL).
//! 3. Wait for the completion gate, unbounded unless a login timeout is set.
//! 4. Hand the token to the credential emitter, if any.
//! 5. Shut the listener down within the grace period.
//!
//! The credential is emitted before shutdown, so a
//! [`KonfiguratorError::ShutdownTimeout`] does not lose it.

use std::sync::Arc;
use std::time::Duration;

use crate::browser::{self, BrowserLauncher};
use crate::callback::listener::CallbackListener;
use crate::error::{KonfiguratorError, Result};
use crate::kubeconfig::CredentialEmitter;
use crate::oidc::exchange::{IdentityToken, TokenExchanger};
use crate::oidc::session::Session;

/// Default time allowed for the listener to stop after completion.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Timing knobs for [`Orchestrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub shutdown_grace: Duration,
    /// `None` waits for the login indefinitely.
    pub login_timeout: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            login_timeout: None,
        }
    }
}

/// Owns the session and its collaborators for one login.
pub struct Orchestrator {
    session: Arc<Session>,
    exchanger: Arc<dyn TokenExchanger>,
    browser: Arc<dyn BrowserLauncher>,
    emitter: Option<Arc<dyn CredentialEmitter>>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        session: Arc<Session>,
        exchanger: Arc<dyn TokenExchanger>,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            session,
            exchanger,
            browser,
            emitter: None,
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn CredentialEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Runs the login and returns the identity token.
    ///
    /// # Errors
    ///
    /// - [`KonfiguratorError::Setup`] if the listener cannot bind.
    /// - [`KonfiguratorError::LoginTimeout`] if a login timeout is set and
    ///   expires.
    /// - Any error from the credential emitter.
    /// - [`KonfiguratorError::ShutdownTimeout`] if the listener outlives the
    ///   grace period.
    pub async fn run(&self) -> Result<IdentityToken> {
        let listener = CallbackListener::new(Arc::clone(&self.session), Arc::clone(&self.exchanger));
        let running = listener.start().await?;

        browser::open_or_print(self.browser.as_ref(), &running.root_url());

        let gate = listener.gate();
        match self.options.login_timeout {
            None => gate.wait().await,
            Some(limit) => {
                if !gate.wait_timeout(limit).await {
                    tracing::warn!("No successful login within {:?}", limit);
                    if let Err(e) = running.shutdown(self.options.shutdown_grace).await {
                        tracing::warn!("{:#}", e);
                    }
                    return Err(KonfiguratorError::LoginTimeout(limit).into());
                }
            }
        }

        let token = listener.token().ok_or_else(|| {
            KonfiguratorError::Exchange("completion signalled without a stored token".to_string())
        })?;

        let emitted = match &self.emitter {
            Some(emitter) => emitter.emit(&token),
            None => Ok(()),
        };
        let stopped = running.shutdown(self.options.shutdown_grace).await;

        emitted?;
        stopped?;
        Ok(token)
    }
}
