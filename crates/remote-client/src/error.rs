//! Remote cluster client errors

use thiserror::Error;

/// Errors that can occur while seeding a workload cluster
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Kubeconfig could not be parsed or turned into a client
    #[error("Invalid kubeconfig: {0}")]
    InvalidKubeconfig(String),

    /// Workload cluster API server could not be reached
    #[error("Cluster unreachable: {0}")]
    Unreachable(String),

    /// Workload cluster API server rejected a request
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Add-on manifest could not be downloaded
    #[error("Manifest fetch failed: {0}")]
    ManifestFetch(String),

    /// Add-on manifest could not be parsed or names an unknown kind
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}

impl RemoteError {
    /// Failures that resolve by themselves once the cluster or the network
    /// catches up
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) | RemoteError::ManifestFetch(_) => true,
            RemoteError::Api { code, .. } => *code == 429 || *code >= 500,
            RemoteError::InvalidKubeconfig(_) | RemoteError::InvalidManifest(_) => false,
        }
    }
}

impl From<kube::Error> for RemoteError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => RemoteError::Api {
                code: ae.code,
                message: ae.message.clone(),
            },
            other => RemoteError::Unreachable(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::ManifestFetch(err.to_string())
    }
}
