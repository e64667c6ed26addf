//! Kubeconfig generation
//!
//! Turns the identity token plus the cluster connection parameters into a
//! kubeconfig with one cluster, one user and one context, and writes it to
//! a file or stdout.

use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{KonfiguratorError, Result};
use crate::oidc::exchange::IdentityToken;

pub const CLUSTER_NAME: &str = "kubernetes";
pub const USER_NAME: &str = "oidc-user";
pub const CONTEXT_NAME: &str = "konfigurator";

/// Hands a retrieved identity token to whatever produces the credential.
pub trait CredentialEmitter: Send + Sync {
    /// Emits the credential for `token`.
    ///
    /// # Errors
    ///
    /// Returns [`KonfiguratorError::Credential`] or an IO error if the
    /// credential cannot be written.
    fn emit(&self, token: &IdentityToken) -> Result<()>;
}

/// Cluster connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterParams {
    /// Cluster CA: a path to a PEM file or base64-encoded PEM data.
    pub ca: String,
    pub api_url: String,
    pub namespace: String,
}

/// Resolves the configured CA into base64 `certificate-authority-data`.
///
/// A value naming an existing file is read and encoded; anything else must
/// already be valid base64.  An empty value yields `None`.
///
/// # Errors
///
/// Returns [`KonfiguratorError::Credential`] for unreadable files or
/// invalid base64.
pub fn resolve_ca_data(ca: &str) -> Result<Option<String>> {
    let ca = ca.trim();
    if ca.is_empty() {
        return Ok(None);
    }

    let engine = base64::engine::general_purpose::STANDARD;
    let path = Path::new(ca);
    if path.is_file() {
        let bytes = std::fs::read(path).map_err(|e| {
            KonfiguratorError::Credential(format!("failed to read cluster CA {ca}: {e}"))
        })?;
        return Ok(Some(engine.encode(bytes)));
    }

    engine.decode(ca).map_err(|e| {
        KonfiguratorError::Credential(format!(
            "cluster CA is neither a readable file nor base64 data: {e}"
        ))
    })?;
    Ok(Some(ca.to_string()))
}

/// Kubeconfig document as serialized to YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub server: String,
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub cluster: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub token: String,
}

impl KubeConfig {
    /// Builds the kubeconfig for `token`.
    ///
    /// `ca_data` is the already resolved base64 CA, see [`resolve_ca_data`].
    pub fn new(
        params: &ClusterParams,
        ca_data: Option<String>,
        token: &IdentityToken,
    ) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: CLUSTER_NAME.to_string(),
                cluster: Cluster {
                    server: params.api_url.clone(),
                    certificate_authority_data: ca_data,
                },
            }],
            contexts: vec![NamedContext {
                name: CONTEXT_NAME.to_string(),
                context: Context {
                    cluster: CLUSTER_NAME.to_string(),
                    user: USER_NAME.to_string(),
                    namespace: params.namespace.clone(),
                },
            }],
            current_context: CONTEXT_NAME.to_string(),
            users: vec![NamedUser {
                name: USER_NAME.to_string(),
                user: User {
                    token: token.raw_value().to_string(),
                },
            }],
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Where the kubeconfig goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// `None` or an empty path selects stdout.
    pub fn from_option(path: Option<&str>) -> Self {
        match path.map(str::trim) {
            Some(p) if !p.is_empty() => Self::File(PathBuf::from(p)),
            _ => Self::Stdout,
        }
    }
}

/// [`CredentialEmitter`] writing a kubeconfig.
#[derive(Debug, Clone)]
pub struct KubeConfigWriter {
    params: ClusterParams,
    ca_data: Option<String>,
    output: OutputTarget,
}

impl KubeConfigWriter {
    /// Resolves the CA up front so a bad value fails before the login.
    pub fn new(params: ClusterParams, output: OutputTarget) -> Result<Self> {
        let ca_data = resolve_ca_data(&params.ca)?;
        Ok(Self {
            params,
            ca_data,
            output,
        })
    }

    pub fn render(&self, token: &IdentityToken) -> Result<String> {
        KubeConfig::new(&self.params, self.ca_data.clone(), token).to_yaml()
    }
}

impl CredentialEmitter for KubeConfigWriter {
    fn emit(&self, token: &IdentityToken) -> Result<()> {
        let yaml = self.render(token)?;

        match &self.output {
            OutputTarget::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(yaml.as_bytes())?;
                stdout.flush()?;
            }
            OutputTarget::File(path) => {
                let mut file = create_private_file(path).map_err(|e| {
                    KonfiguratorError::Credential(format!(
                        "failed to create {}: {e}",
                        path.display()
                    ))
                })?;
                file.write_all(yaml.as_bytes())?;
                tracing::info!(path = %path.display(), "Kubeconfig written");
            }
        }

        Ok(())
    }
}

fn create_private_file(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
