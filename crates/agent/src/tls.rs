//! TLS material for the coordination client.

use crate::config::ConfigError;
use election::{Certificate, Identity, TlsOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default client certificate path
pub const DEFAULT_CERT: &str = "etcd.crt";

/// Default client key path
pub const DEFAULT_KEY: &str = "etcd.key";

/// Default CA bundle path
pub const DEFAULT_CA_CERT: &str = "etcd-ca.crt";

/// PEM files used to authenticate against etcd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub ca: PathBuf,
}

impl Default for TlsFiles {
    fn default() -> Self {
        Self {
            cert: PathBuf::from(DEFAULT_CERT),
            key: PathBuf::from(DEFAULT_KEY),
            ca: PathBuf::from(DEFAULT_CA_CERT),
        }
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ConfigError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ConfigError::TlsFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Read the PEM files and build client TLS options.
///
/// PEM contents are checked when the connection is established.
pub async fn load(files: &TlsFiles) -> Result<TlsOptions, ConfigError> {
    let cert = read(&files.cert).await?;
    let key = read(&files.key).await?;
    let ca = read(&files.ca).await?;

    debug!(
        cert = %files.cert.display(),
        key = %files.key.display(),
        ca = %files.ca.display(),
        "Loaded TLS material"
    );

    Ok(TlsOptions::new()
        .ca_certificate(Certificate::from_pem(ca))
        .identity(Identity::from_pem(cert, key)))
}
