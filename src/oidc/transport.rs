//! Outbound HTTP transport with optional custom certificate trust
//!
//! Discovery and token exchange go through a [`reqwest::Client`] whose
//! root store can be extended with extra certificate authorities taken
//! from `KONFIGURATOR_CAFILE` (a PEM file, possibly a bundle) and
//! `KONFIGURATOR_CAPATH` (a directory of PEM files).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{KonfiguratorError, Result};

/// Environment variable naming a PEM CA file.
pub const CA_FILE_ENV: &str = "KONFIGURATOR_CAFILE";

/// Environment variable naming a directory of PEM CA files.
pub const CA_PATH_ENV: &str = "KONFIGURATOR_CAPATH";

/// Extra trust roots for the outbound client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca_file: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
}

impl TlsSettings {
    /// Reads [`CA_FILE_ENV`] and [`CA_PATH_ENV`]; empty values are ignored.
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        };

        Self {
            ca_file: read(CA_FILE_ENV),
            ca_path: read(CA_PATH_ENV),
        }
    }

    /// Loads every certificate named by these settings.
    ///
    /// # Errors
    ///
    /// Returns [`KonfiguratorError::Setup`] when a file cannot be read or
    /// holds no usable certificate.
    pub fn load_certificates(&self) -> Result<Vec<reqwest::Certificate>> {
        let mut certs = Vec::new();

        if let Some(file) = &self.ca_file {
            certs.extend(load_pem_file(file)?);
        }

        if let Some(dir) = &self.ca_path {
            let entries = std::fs::read_dir(dir).map_err(|e| {
                KonfiguratorError::Setup(format!("failed to read CA path {}: {e}", dir.display()))
            })?;

            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            files.sort();

            for file in files {
                match load_pem_file(&file) {
                    Ok(found) => certs.extend(found),
                    // directories such as /etc/ssl/certs mix PEM with other files
                    Err(e) => tracing::debug!(path = %file.display(), error = %e, "Skipping CA file"),
                }
            }
        }

        Ok(certs)
    }
}

fn load_pem_file(path: &Path) -> Result<Vec<reqwest::Certificate>> {
    let contents = std::fs::read(path).map_err(|e| {
        KonfiguratorError::Setup(format!("failed to read CA file {}: {e}", path.display()))
    })?;

    let certs = reqwest::Certificate::from_pem_bundle(&contents).map_err(|e| {
        KonfiguratorError::Setup(format!("invalid certificate in {}: {e}", path.display()))
    })?;
    if certs.is_empty() {
        return Err(KonfiguratorError::Setup(format!(
            "no PEM certificates found in {}",
            path.display()
        ))
        .into());
    }

    Ok(certs)
}

/// Builds the outbound client used for discovery and token exchange.
///
/// # Errors
///
/// Returns [`KonfiguratorError::Setup`] when certificates cannot be loaded
/// or the client cannot be constructed.
pub fn build_http_client(settings: &TlsSettings) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("konfigurator/", env!("CARGO_PKG_VERSION")));

    let certs = settings.load_certificates()?;
    if !certs.is_empty() {
        tracing::debug!(count = certs.len(), "Adding custom root certificates");
    }
    for cert in certs {
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| KonfiguratorError::Setup(format!("failed to build HTTP client: {e}")).into())
}
