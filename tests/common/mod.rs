#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use url::Url;

use konfigurator::browser::BrowserLauncher;
use konfigurator::kubeconfig::CredentialEmitter;
use konfigurator::{IdentityToken, KonfiguratorError, Session, TokenExchanger};

pub const STATE: &str = "abc123";
pub const VALID_CODE: &str = "validcode";
pub const ID_TOKEN: &str = "eyJ...";
/// Code whose exchange hangs far longer than any shutdown grace period.
pub const STALLED_CODE: &str = "stalled";

/// Session bound to an ephemeral loopback port with a fixed state.
pub fn loopback_session() -> Arc<Session> {
    Arc::new(Session::with_anti_forgery_token(
        STATE,
        "kube",
        "127.0.0.1:0",
        "/oauth2/callback",
        Url::parse("https://id.example.com/authorize").expect("valid URL"),
        Url::parse("https://id.example.com/token").expect("valid URL"),
    ))
}

/// Accepts [`VALID_CODE`] and rejects every other code.
#[derive(Default)]
pub struct StubExchanger {
    calls: Mutex<Vec<String>>,
}

impl StubExchanger {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchanger for StubExchanger {
    async fn exchange(&self, code: &str) -> konfigurator::Result<IdentityToken> {
        self.calls.lock().unwrap().push(code.to_string());
        if code == STALLED_CODE {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if code == VALID_CODE {
            Ok(IdentityToken::new(ID_TOKEN))
        } else {
            Err(KonfiguratorError::Exchange(format!("invalid code {code}")).into())
        }
    }
}

/// Plays the browser: on `open`, requests the callback route of the
/// listener at `url` with each query in turn.
///
/// By default each request waits for the previous response.  With
/// [`CallbackBrowser::overlapping`] every request runs in its own task,
/// started `stagger` after the previous one, so a stalled exchange does
/// not hold back the next callback.
pub struct CallbackBrowser {
    queries: Vec<String>,
    stagger: Option<Duration>,
}

impl CallbackBrowser {
    pub fn new(queries: &[&str]) -> Self {
        Self {
            queries: queries.iter().map(|q| q.to_string()).collect(),
            stagger: None,
        }
    }

    pub fn overlapping(queries: &[&str], stagger: Duration) -> Self {
        Self {
            stagger: Some(stagger),
            ..Self::new(queries)
        }
    }
}

impl BrowserLauncher for CallbackBrowser {
    fn open(&self, url: &str) -> konfigurator::Result<()> {
        let base = url.trim_end_matches('/').to_string();
        let urls: Vec<String> = self
            .queries
            .iter()
            .map(|query| format!("{base}/oauth2/callback?{query}"))
            .collect();
        let stagger = self.stagger;

        tokio::spawn(async move {
            let client = reqwest::Client::new();
            for url in urls {
                match stagger {
                    None => {
                        let _ = client.get(url).send().await;
                    }
                    Some(delay) => {
                        let client = client.clone();
                        tokio::spawn(async move {
                            let _ = client.get(url).send().await;
                        });
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });
        Ok(())
    }
}

/// Records opened URLs without doing anything.
#[derive(Default)]
pub struct RecordingBrowser {
    pub opened: Mutex<Vec<String>>,
}

impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> konfigurator::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Keeps the emitted token in memory.
#[derive(Default)]
pub struct MemoryEmitter {
    pub emitted: Mutex<Vec<String>>,
}

impl CredentialEmitter for MemoryEmitter {
    fn emit(&self, token: &IdentityToken) -> konfigurator::Result<()> {
        self.emitted
            .lock()
            .unwrap()
            .push(token.raw_value().to_string());
        Ok(())
    }
}

pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("konfigurator.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
