//! Mock remote cluster for unit testing
//!
//! Every handle produced by one [`MockRemoteConnector`] shares a single
//! in-memory "workload cluster", so tests can inspect what a bootstrap pass
//! left behind and run the same pass again to check idempotence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use k8s_openapi::api::core::v1::Secret;

use crate::error::RemoteError;
use crate::remote_trait::{RemoteCluster, RemoteClusterConnector};

/// Failure a test can arm on the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailure {
    /// `connect` rejects the kubeconfig
    InvalidKubeconfig,
    /// every call on the cluster reports it unreachable
    Unreachable,
    /// manifest download fails
    ManifestUnavailable,
}

#[derive(Debug, Default)]
struct State {
    connections: Vec<Vec<u8>>,
    namespaces: BTreeSet<String>,
    secrets: BTreeMap<(String, String), Secret>,
    applied_urls: Vec<String>,
    manifest_objects: usize,
    failure: Option<RemoteFailure>,
}

/// In-memory [`RemoteClusterConnector`]
#[derive(Debug, Clone)]
pub struct MockRemoteConnector {
    state: Arc<Mutex<State>>,
}

impl Default for MockRemoteConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                manifest_objects: 1,
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or with `None`, clear) a failure
    pub fn fail_with(&self, failure: Option<RemoteFailure>) {
        self.lock().failure = failure;
    }

    /// Number of objects each applied manifest reports
    pub fn set_manifest_objects(&self, count: usize) {
        self.lock().manifest_objects = count;
    }

    /// Kubeconfig payloads `connect` was called with
    pub fn connections(&self) -> Vec<Vec<u8>> {
        self.lock().connections.clone()
    }

    pub fn namespaces(&self) -> BTreeSet<String> {
        self.lock().namespaces.clone()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn secret_count(&self) -> usize {
        self.lock().secrets.len()
    }

    pub fn applied_urls(&self) -> Vec<String> {
        self.lock().applied_urls.clone()
    }
}

#[async_trait::async_trait]
impl RemoteClusterConnector for MockRemoteConnector {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn RemoteCluster>, RemoteError> {
        let mut state = self.lock();
        state.connections.push(kubeconfig.to_vec());
        if state.failure == Some(RemoteFailure::InvalidKubeconfig) {
            return Err(RemoteError::InvalidKubeconfig("mock rejected kubeconfig".to_string()));
        }
        Ok(Box::new(MockRemoteCluster {
            connector: self.clone(),
        }))
    }
}

#[derive(Debug)]
struct MockRemoteCluster {
    connector: MockRemoteConnector,
}

impl MockRemoteCluster {
    fn reachable(&self) -> Result<MutexGuard<'_, State>, RemoteError> {
        let state = self.connector.lock();
        if state.failure == Some(RemoteFailure::Unreachable) {
            return Err(RemoteError::Unreachable("mock cluster is down".to_string()));
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl RemoteCluster for MockRemoteCluster {
    async fn ensure_namespace(&self, name: &str) -> Result<(), RemoteError> {
        self.reachable()?.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn upsert_secret(&self, secret: &Secret) -> Result<(), RemoteError> {
        let mut state = self.reachable()?;
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        if !state.namespaces.contains(&namespace) {
            return Err(RemoteError::Api {
                code: 404,
                message: format!("namespaces \"{namespace}\" not found"),
            });
        }
        let name = secret.metadata.name.clone().unwrap_or_default();
        state.secrets.insert((namespace, name), secret.clone());
        Ok(())
    }

    async fn apply_manifest_url(&self, url: &str) -> Result<usize, RemoteError> {
        let mut state = self.reachable()?;
        if state.failure == Some(RemoteFailure::ManifestUnavailable) {
            return Err(RemoteError::ManifestFetch(format!("GET {url} returned 503")));
        }
        state.applied_urls.push(url.to_string());
        Ok(state.manifest_objects)
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    fn secret(namespace: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("creds".into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn handles_share_one_cluster() {
        let connector = MockRemoteConnector::new();
        let first = connector.connect(b"kubeconfig").await.unwrap();
        first.ensure_namespace("bale-system").await.unwrap();
        first.upsert_secret(&secret("bale-system")).await.unwrap();

        let second = connector.connect(b"kubeconfig").await.unwrap();
        second.upsert_secret(&secret("bale-system")).await.unwrap();

        assert_eq!(connector.connections().len(), 2);
        assert_eq!(connector.secret_count(), 1);
    }

    #[tokio::test]
    async fn secret_requires_namespace() {
        let connector = MockRemoteConnector::new();
        let cluster = connector.connect(b"kubeconfig").await.unwrap();
        let err = cluster.upsert_secret(&secret("missing")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Api { code: 404, .. }));
    }

    #[tokio::test]
    async fn armed_failures() {
        let connector = MockRemoteConnector::new();

        connector.fail_with(Some(RemoteFailure::InvalidKubeconfig));
        assert!(connector.connect(b"garbage").await.is_err());

        connector.fail_with(Some(RemoteFailure::Unreachable));
        let cluster = connector.connect(b"kubeconfig").await.unwrap();
        let err = cluster.ensure_namespace("x").await.unwrap_err();
        assert!(err.is_transient());

        connector.fail_with(Some(RemoteFailure::ManifestUnavailable));
        let err = cluster.apply_manifest_url("https://example.test/a.yaml").await.unwrap_err();
        assert!(matches!(err, RemoteError::ManifestFetch(_)));

        connector.fail_with(None);
        assert_eq!(cluster.apply_manifest_url("https://example.test/a.yaml").await.unwrap(), 1);
        assert_eq!(connector.applied_urls().len(), 1);
    }
}
