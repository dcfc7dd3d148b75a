//! Kube-backed remote cluster client

use std::fmt;

use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::{Discovery, Scope};
use kube::{Client, Config};
use serde_json::json;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::manifest::{self, ManifestObject};
use crate::remote_trait::{RemoteCluster, RemoteClusterConnector};

/// Connects to workload clusters with a kubeconfig
#[derive(Debug, Clone)]
pub struct KubeConnector {
    field_manager: String,
    http: reqwest::Client,
}

impl KubeConnector {
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl RemoteClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: &[u8]) -> Result<Box<dyn RemoteCluster>, RemoteError> {
        let text = std::str::from_utf8(kubeconfig)
            .map_err(|e| RemoteError::InvalidKubeconfig(format!("not UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(text)
            .map_err(|e| RemoteError::InvalidKubeconfig(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| RemoteError::InvalidKubeconfig(e.to_string()))?;
        debug!("Connecting to workload cluster at {}", config.cluster_url);
        let client = Client::try_from(config)
            .map_err(|e| RemoteError::InvalidKubeconfig(e.to_string()))?;

        Ok(Box::new(KubeRemoteCluster {
            client,
            field_manager: self.field_manager.clone(),
            http: self.http.clone(),
        }))
    }
}

/// One workload cluster, written to with server-side apply
pub struct KubeRemoteCluster {
    client: Client,
    field_manager: String,
    http: reqwest::Client,
}

impl fmt::Debug for KubeRemoteCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeRemoteCluster")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeRemoteCluster {
    fn apply_params(&self) -> PatchParams {
        PatchParams::apply(&self.field_manager).force()
    }

    async fn fetch(&self, url: &str) -> Result<String, RemoteError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::ManifestFetch(format!("GET {url} returned {status}")));
        }
        Ok(response.text().await?)
    }

    async fn discover(&self) -> Result<Discovery, RemoteError> {
        Ok(Discovery::new(self.client.clone()).run().await?)
    }

    /// Apply one object; `Ok(false)` when its kind is not served (yet).
    async fn apply_object(&self, discovery: &Discovery, object: &ManifestObject) -> Result<bool, RemoteError> {
        let Some((resource, caps)) = discovery.resolve_gvk(&object.gvk) else {
            return Ok(false);
        };
        let api: Api<DynamicObject> = match (caps.scope, &object.namespace) {
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &resource),
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource),
            (Scope::Namespaced, None) => Api::default_namespaced_with(self.client.clone(), &resource),
        };
        api.patch(&object.name, &self.apply_params(), &Patch::Apply(&object.body))
            .await?;
        debug!("Applied {}", object.describe());
        Ok(true)
    }
}

#[async_trait::async_trait]
impl RemoteCluster for KubeRemoteCluster {
    async fn ensure_namespace(&self, name: &str) -> Result<(), RemoteError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name }
        });
        api.patch(name, &self.apply_params(), &Patch::Apply(&ns)).await?;
        Ok(())
    }

    async fn upsert_secret(&self, secret: &Secret) -> Result<(), RemoteError> {
        let name = secret.metadata.name.as_deref().ok_or_else(|| RemoteError::Api {
            code: 422,
            message: "secret has no name".to_string(),
        })?;
        let namespace = secret.metadata.namespace.as_deref().ok_or_else(|| RemoteError::Api {
            code: 422,
            message: format!("secret {name} has no namespace"),
        })?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.patch(name, &self.apply_params(), &Patch::Apply(secret)).await?;
        Ok(())
    }

    async fn apply_manifest_url(&self, url: &str) -> Result<usize, RemoteError> {
        let text = self.fetch(url).await?;
        let objects = manifest::parse_documents(&text)?;

        // Kinds defined by CRDs in the same manifest only resolve after the
        // CRDs are applied, so unresolved documents get one more pass.
        let discovery = self.discover().await?;
        let mut deferred = Vec::new();
        for object in &objects {
            if !self.apply_object(&discovery, object).await? {
                deferred.push(object);
            }
        }

        if !deferred.is_empty() {
            debug!("Re-running discovery for {} deferred objects", deferred.len());
            let discovery = self.discover().await?;
            for object in deferred {
                if !self.apply_object(&discovery, object).await? {
                    return Err(RemoteError::InvalidManifest(format!(
                        "unknown resource type for {}",
                        object.describe()
                    )));
                }
            }
        }

        info!("Applied {} objects from {}", objects.len(), url);
        Ok(objects.len())
    }
}
