//! Remote cluster traits for mocking
//!
//! The concrete kube-backed types implement these traits, and tests use the
//! mock implementations.

use k8s_openapi::api::core::v1::Secret;

use crate::error::RemoteError;

/// Builds a [`RemoteCluster`] handle from kubeconfig bytes
#[async_trait::async_trait]
pub trait RemoteClusterConnector: Send + Sync {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn RemoteCluster>, RemoteError>;
}

/// Idempotent writes against one workload cluster
#[async_trait::async_trait]
pub trait RemoteCluster: Send + Sync {
    /// Create the namespace if it does not exist
    async fn ensure_namespace(&self, name: &str) -> Result<(), RemoteError>;

    /// Create or overwrite a secret; namespace and name come from its metadata
    async fn upsert_secret(&self, secret: &Secret) -> Result<(), RemoteError>;

    /// Download a multi-document YAML manifest and apply every document.
    /// Returns the number of objects applied.
    async fn apply_manifest_url(&self, url: &str) -> Result<usize, RemoteError>;
}
