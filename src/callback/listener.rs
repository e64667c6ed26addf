//! Local HTTP listener receiving the provider callback
//!
//! The listener exposes three routes on a router owned by the instance:
//!
//! - `GET /` redirects the browser to the provider authorization URL.
//! - `GET /favicon.ico` answers `204 No Content`.
//! - `GET <callback path>` validates `state`, exchanges `code` and, on
//!   success, stores the identity token and fires the completion gate.
//!
//! Rejected callbacks (state mismatch, provider error, failed exchange, a
//! code already being exchanged) get an empty response and leave the
//! listener accepting further attempts.  Nothing about the failure is
//! disclosed to the caller.  Each code is exchanged at most once at a time.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::callback::gate::CompletionGate;
use crate::error::{KonfiguratorError, Result};
use crate::oidc::authorize::build_authorization_url;
use crate::oidc::exchange::{IdentityToken, TokenExchanger};
use crate::oidc::session::Session;

/// Page served after a successful login.  Closes its own tab after two
/// seconds.
pub const CONFIRMATION_PAGE: &str = r#"<!DOCTYPE html>
<html>
    <head><title>Konfigurator</title></head>
    <body>
        Token retrieved successfully.
        This tab will close soon.

        <script>
            setTimeout(function() {
                window.close();
            }, 2000);
        </script>
    </body>
</html>
"#;

/// Lifecycle phase of a [`CallbackListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerPhase {
    Idle = 0,
    Listening = 1,
    Validating = 2,
    Exchanging = 3,
    Completed = 4,
    ShuttingDown = 5,
    Stopped = 6,
}

impl ListenerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Listening,
            2 => Self::Validating,
            3 => Self::Exchanging,
            4 => Self::Completed,
            5 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// `Completed`, `ShuttingDown` and `Stopped` are sticky: a late failing
    /// request cannot drag the listener back to `Listening`.
    fn can_move_to(self, next: Self) -> bool {
        match self {
            Self::Completed => matches!(next, Self::ShuttingDown | Self::Stopped),
            Self::ShuttingDown => next == Self::Stopped,
            Self::Stopped => false,
            _ => true,
        }
    }
}

/// Query parameters of one callback request.
///
/// Every field is optional so a partial or malformed redirect still
/// reaches the state check instead of being rejected by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackRequest {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackRequest {
    /// A callback carrying only `state` and `code`.
    pub fn new(state: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            state: Some(state.into()),
            code: Some(code.into()),
            ..Default::default()
        }
    }
}

/// What happened to a callback request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// `state` did not match the anti-forgery token.
    StateMismatch,
    /// The provider redirected with an `error` parameter.
    ProviderError,
    /// The code exchange failed, or no code was supplied.
    ExchangeFailed,
    /// The same code is already being exchanged by another request.
    ExchangeInFlight,
    /// A token had already been stored; the request was not exchanged.
    AlreadyCompleted,
    /// This request stored the token and fired the gate.
    Completed,
}

struct ListenerState {
    session: Arc<Session>,
    exchanger: Arc<dyn TokenExchanger>,
    token: OnceLock<IdentityToken>,
    gate: Arc<CompletionGate>,
    phase: AtomicU8,
    /// Codes currently being exchanged; a code leaves the set when its
    /// exchange fails.
    in_flight: Mutex<HashSet<String>>,
}

impl ListenerState {
    fn phase(&self) -> ListenerPhase {
        ListenerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn move_to(&self, next: ListenerPhase) -> bool {
        self.phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                ListenerPhase::from_u8(current)
                    .can_move_to(next)
                    .then_some(next as u8)
            })
            .is_ok()
    }

    /// Marks `code` as being exchanged.  Returns `false` if it already was.
    fn claim_code(&self, code: &str) -> bool {
        match self.in_flight.lock() {
            Ok(mut codes) => codes.insert(code.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(code.to_string()),
        }
    }

    fn release_code(&self, code: &str) {
        match self.in_flight.lock() {
            Ok(mut codes) => codes.remove(code),
            Err(poisoned) => poisoned.into_inner().remove(code),
        };
    }

    async fn process_callback(&self, request: CallbackRequest) -> CallbackOutcome {
        if self.gate.is_fired() {
            tracing::debug!("Ignoring callback received after completion");
            return CallbackOutcome::AlreadyCompleted;
        }

        self.move_to(ListenerPhase::Validating);
        let received = request.state.as_deref().unwrap_or("");
        if !self.session.state_matches(received) {
            let err = KonfiguratorError::CallbackValidation(format!(
                "received state {:?} does not match",
                received
            ));
            tracing::warn!("{}", err);
            self.move_to(ListenerPhase::Listening);
            return CallbackOutcome::StateMismatch;
        }

        if let Some(error) = &request.error {
            tracing::warn!(
                error = %error,
                description = request.error_description.as_deref().unwrap_or(""),
                "Provider returned an error to the callback"
            );
            self.move_to(ListenerPhase::Listening);
            return CallbackOutcome::ProviderError;
        }

        let code = match request.code.as_deref() {
            Some(code) if !code.is_empty() => code,
            _ => {
                tracing::warn!("Callback carried no authorization code");
                self.move_to(ListenerPhase::Listening);
                return CallbackOutcome::ExchangeFailed;
            }
        };

        if !self.claim_code(code) {
            tracing::debug!("Authorization code is already being exchanged");
            return CallbackOutcome::ExchangeInFlight;
        }

        self.move_to(ListenerPhase::Exchanging);
        let token = match self.exchanger.exchange(code).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Failed extracting token: {:#}", e);
                self.release_code(code);
                self.move_to(ListenerPhase::Listening);
                return CallbackOutcome::ExchangeFailed;
            }
        };

        if self.token.set(token).is_err() {
            tracing::debug!("Token already stored by a concurrent callback");
            return CallbackOutcome::AlreadyCompleted;
        }

        self.move_to(ListenerPhase::Completed);
        self.gate.fire();
        tracing::info!("Identity token retrieved");
        CallbackOutcome::Completed
    }
}

/// The callback listener for one login session.
///
/// Cloning is cheap; clones share the token slot, gate and phase.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use url::Url;
/// use konfigurator::callback::listener::CallbackListener;
/// use konfigurator::oidc::{HttpTokenExchanger, Session};
///
/// # async fn example() -> konfigurator::error::Result<()> {
/// let session = Arc::new(Session::new(
///     "my-client",
///     "localhost:8000",
///     "/oauth2/callback",
///     Url::parse("https://id.example.com/authorize")?,
///     Url::parse("https://id.example.com/token")?,
/// ));
/// let exchanger = Arc::new(HttpTokenExchanger::new(reqwest::Client::new(), session.clone()));
///
/// let listener = CallbackListener::new(session, exchanger);
/// let running = listener.start().await?;
/// listener.gate().wait().await;
/// running.shutdown(Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CallbackListener {
    state: Arc<ListenerState>,
}

impl CallbackListener {
    pub fn new(session: Arc<Session>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            state: Arc::new(ListenerState {
                session,
                exchanger,
                token: OnceLock::new(),
                gate: Arc::new(CompletionGate::new()),
                phase: AtomicU8::new(ListenerPhase::Idle as u8),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Builds the router serving this listener's routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_root))
            .route("/favicon.ico", get(handle_favicon))
            .route(self.state.session.callback_path(), get(handle_callback))
            .with_state(Arc::clone(&self.state))
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.state.session
    }

    pub fn gate(&self) -> Arc<CompletionGate> {
        Arc::clone(&self.state.gate)
    }

    /// The stored identity token, once a callback has succeeded.
    pub fn token(&self) -> Option<IdentityToken> {
        self.state.token.get().cloned()
    }

    pub fn phase(&self) -> ListenerPhase {
        self.state.phase()
    }

    /// Runs the callback state machine for one request.
    pub async fn handle(&self, request: CallbackRequest) -> CallbackOutcome {
        self.state.process_callback(request).await
    }

    /// Binds the session's listen address and starts serving in a
    /// background task.
    ///
    /// The socket is accepting connections when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`KonfiguratorError::Setup`] if the address cannot be bound.
    pub async fn start(&self) -> Result<RunningListener> {
        let address = self.state.session.listen_address().to_string();
        let tcp = TcpListener::bind(&address).await.map_err(|e| {
            KonfiguratorError::Setup(format!("failed to bind callback listener on {address}: {e}"))
        })?;
        let local_addr = tcp
            .local_addr()
            .map_err(|e| KonfiguratorError::Setup(format!("failed to get local address: {e}")))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router();
        self.state.move_to(ListenerPhase::Listening);
        tracing::info!(addr = %local_addr, "Callback listener started");

        let task = tokio::spawn(async move {
            axum::serve(tcp, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(RunningListener {
            listener: self.clone(),
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

/// Handle to a listener serving in the background.
pub struct RunningListener {
    listener: CallbackListener,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn listener(&self) -> &CallbackListener {
        &self.listener
    }

    /// Base URL of the listener, keeping the host name from the session
    /// address so it matches the registered redirect URI.
    pub fn base_url(&self) -> String {
        let configured = self.listener.session().listen_address();
        let host = configured
            .rsplit_once(':')
            .map(|(host, _)| host)
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.local_addr.ip().to_string());
        format!("http://{}:{}", host, self.local_addr.port())
    }

    /// URL the browser is pointed at.
    pub fn root_url(&self) -> String {
        format!("{}/", self.base_url())
    }

    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url(),
            self.listener.session().callback_path()
        )
    }

    /// Stops accepting connections and waits up to `grace` for in-flight
    /// requests to finish.
    ///
    /// # Errors
    ///
    /// Returns [`KonfiguratorError::ShutdownTimeout`] if the server is still
    /// running after `grace`; the server task is aborted in that case.
    pub async fn shutdown(mut self, grace: Duration) -> Result<()> {
        self.listener.state.move_to(ListenerPhase::ShuttingDown);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(Ok(()))) => {
                self.listener.state.move_to(ListenerPhase::Stopped);
                tracing::info!("Callback listener stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                self.listener.state.move_to(ListenerPhase::Stopped);
                Err(KonfiguratorError::Io(e).into())
            }
            Ok(Err(join_err)) => {
                self.listener.state.move_to(ListenerPhase::Stopped);
                Err(KonfiguratorError::Setup(format!("listener task failed: {join_err}")).into())
            }
            Err(_) => {
                self.task.abort();
                self.listener.state.move_to(ListenerPhase::Stopped);
                Err(KonfiguratorError::ShutdownTimeout(grace).into())
            }
        }
    }
}

async fn handle_root(State(state): State<Arc<ListenerState>>) -> Response {
    let url = build_authorization_url(&state.session, state.session.anti_forgery_token());
    tracing::debug!("Redirecting browser to provider authorization endpoint");
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

async fn handle_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_callback(
    State(state): State<Arc<ListenerState>>,
    query: Option<Query<CallbackRequest>>,
) -> Response {
    let request = query.map(|Query(request)| request).unwrap_or_default();

    match state.process_callback(request).await {
        CallbackOutcome::Completed => Html(CONFIRMATION_PAGE).into_response(),
        // an earlier request already won; this browser still authenticated
        CallbackOutcome::AlreadyCompleted if state.token.get().is_some() => {
            Html(CONFIRMATION_PAGE).into_response()
        }
        _ => StatusCode::OK.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::test_utils::{test_session, TEST_STATE};

    /// Returns `token` (or fails when `None`) after `delay`, counting calls.
    struct FixedExchanger {
        token: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedExchanger {
        fn new(token: Option<&'static str>) -> Self {
            Self::slow(token, Duration::ZERO)
        }

        fn slow(token: Option<&'static str>, delay: Duration) -> Self {
            Self {
                token,
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenExchanger for FixedExchanger {
        async fn exchange(&self, _code: &str) -> Result<IdentityToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.token {
                Some(token) => Ok(IdentityToken::new(token)),
                None => Err(KonfiguratorError::Exchange("rejected".to_string()).into()),
            }
        }
    }

    fn listener(exchanger: Arc<FixedExchanger>) -> CallbackListener {
        CallbackListener::new(Arc::new(test_session()), exchanger)
    }

    async fn get(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&body).into_owned()
    }

    #[test]
    fn test_terminal_phases_are_sticky() {
        assert!(!ListenerPhase::Completed.can_move_to(ListenerPhase::Listening));
        assert!(ListenerPhase::Completed.can_move_to(ListenerPhase::ShuttingDown));
        assert!(!ListenerPhase::ShuttingDown.can_move_to(ListenerPhase::Listening));
        assert!(!ListenerPhase::Stopped.can_move_to(ListenerPhase::Listening));
        assert!(ListenerPhase::Exchanging.can_move_to(ListenerPhase::Listening));
    }

    #[tokio::test]
    async fn test_root_redirects_to_provider() {
        let listener = listener(Arc::new(FixedExchanger::new(None)));
        let response = get(listener.router(), "/").await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://id.example.com/authorize?client_id=kube"));
        assert!(location.contains("state=abc123"));
        assert_eq!(listener.phase(), ListenerPhase::Idle);
    }

    #[tokio::test]
    async fn test_favicon_is_no_content() {
        let listener = listener(Arc::new(FixedExchanger::new(None)));
        let response = get(listener.router(), "/favicon.ico").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_query_parameters_are_decoded() {
        let exchanger = Arc::new(FixedExchanger::new(Some("eyJ...")));
        let listener = listener(exchanger.clone());
        let response = get(
            listener.router(),
            "/oauth2/callback?code=validcode&state=abc%31%323&extra=1",
        )
        .await;

        assert!(body_text(response).await.contains("Token retrieved successfully"));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_or_duplicated_parameters_are_silently_dropped() {
        let exchanger = Arc::new(FixedExchanger::new(Some("eyJ...")));
        let listener = listener(exchanger.clone());

        for uri in [
            "/oauth2/callback",
            "/oauth2/callback?state=abc123",
            "/oauth2/callback?state=abc123&state=abc123&code=validcode",
        ] {
            let response = get(listener.router(), uri).await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert!(body_text(response).await.is_empty(), "{uri}");
        }

        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
        assert!(!listener.gate().is_fired());
    }

    #[tokio::test]
    async fn test_state_mismatch_does_not_exchange_or_fire() {
        let exchanger = Arc::new(FixedExchanger::new(Some("eyJ...")));
        let listener = listener(exchanger.clone());
        let outcome = listener
            .handle(CallbackRequest::new("forged", "validcode"))
            .await;

        assert_eq!(outcome, CallbackOutcome::StateMismatch);
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
        assert!(!listener.gate().is_fired());
        assert!(listener.token().is_none());
    }

    #[tokio::test]
    async fn test_provider_error_is_dropped() {
        let listener = listener(Arc::new(FixedExchanger::new(Some("eyJ..."))));
        let outcome = listener
            .handle(CallbackRequest {
                state: Some(TEST_STATE.to_string()),
                error: Some("access_denied".to_string()),
                error_description: Some("nope".to_string()),
                ..Default::default()
            })
            .await;

        assert_eq!(outcome, CallbackOutcome::ProviderError);
        assert!(!listener.gate().is_fired());
    }

    #[tokio::test]
    async fn test_exchange_failure_returns_empty_body() {
        let listener = listener(Arc::new(FixedExchanger::new(None)));
        let response = get(listener.router(), "/oauth2/callback?state=abc123&code=bad").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.is_empty());
        assert!(!listener.gate().is_fired());
        assert_ne!(listener.phase(), ListenerPhase::Completed);
    }

    #[tokio::test]
    async fn test_failed_code_can_be_retried() {
        let exchanger = Arc::new(FixedExchanger::new(None));
        let listener = listener(exchanger.clone());
        let request = CallbackRequest::new(TEST_STATE, "flaky");

        assert_eq!(listener.handle(request.clone()).await, CallbackOutcome::ExchangeFailed);
        assert_eq!(listener.handle(request).await, CallbackOutcome::ExchangeFailed);
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_successful_callback_stores_token_and_fires() {
        let listener = listener(Arc::new(FixedExchanger::new(Some("eyJ..."))));
        let response = get(listener.router(), "/oauth2/callback?state=abc123&code=validcode").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Token retrieved successfully"));
        assert!(listener.gate().is_fired());
        assert_eq!(listener.token(), Some(IdentityToken::new("eyJ...")));
        assert_eq!(listener.phase(), ListenerPhase::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_with_same_code_exchange_once() {
        let exchanger = Arc::new(FixedExchanger::slow(
            Some("eyJ..."),
            Duration::from_millis(100),
        ));
        let listener = listener(exchanger.clone());
        let request = CallbackRequest::new(TEST_STATE, "validcode");

        let (first, second) = tokio::join!(
            listener.handle(request.clone()),
            listener.handle(request)
        );

        let mut outcomes = [first, second];
        outcomes.sort_by_key(|outcome| *outcome == CallbackOutcome::Completed);
        assert_eq!(
            outcomes,
            [CallbackOutcome::ExchangeInFlight, CallbackOutcome::Completed]
        );
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_after_completion_keeps_first_token() {
        let listener = listener(Arc::new(FixedExchanger::new(Some("first"))));
        let request = CallbackRequest::new(TEST_STATE, "validcode");

        assert_eq!(listener.handle(request).await, CallbackOutcome::Completed);
        assert_eq!(
            listener.handle(CallbackRequest::new(TEST_STATE, "another")).await,
            CallbackOutcome::AlreadyCompleted
        );
        assert_eq!(listener.token(), Some(IdentityToken::new("first")));
    }
}
