//! Remote bootstrap.
//!
//! Once Cluster API has published a kubeconfig for a composed cluster, the
//! controller's own cloud credentials are copied into the workload cluster
//! and the CNI add-on is applied there. Every step is idempotent, so the stage
//! simply runs again on the next reconcile until the cluster answers.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use kube_store::ObjectStore;
use tracing::{debug, info};

use super::Reconciler;
use crate::error::ControllerError;
use crate::naming;
use crate::registry::KUBECONFIG_KEY;

/// A copy of `secret` carrying only what the workload cluster should see:
/// name, target namespace, type and data.
pub fn portable_secret(secret: &Secret, namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: secret.metadata.name.clone(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: secret.data.clone(),
        type_: secret.type_.clone(),
        ..Default::default()
    }
}

/// The kubeconfig payload under its canonical key
pub fn kubeconfig_payload(secret: &Secret) -> Result<&[u8], ControllerError> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_KEY))
        .map(|bytes| bytes.0.as_slice())
        .ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "Secret {} has no {KUBECONFIG_KEY:?} key",
                secret.name_any()
            ))
        })
}

impl<S: ObjectStore> Reconciler<S> {
    /// Seed the workload cluster `cluster` (in `namespace`) with credentials
    /// and the network add-on. Returns how many add-on objects were applied.
    pub async fn propagate_bootstrap(&self, namespace: &str, cluster: &str) -> Result<usize, ControllerError> {
        let registry = &self.registry;

        let credentials: Secret = self
            .store
            .get(&registry.credentials_secret_namespace, &registry.credentials_secret_name)
            .await?
            .ok_or_else(|| {
                ControllerError::NotYetAvailable(format!(
                    "credentials secret {}/{}",
                    registry.credentials_secret_namespace, registry.credentials_secret_name
                ))
            })?;

        let kubeconfig_name = naming::kubeconfig_secret_name(cluster);
        let kubeconfig: Secret = self
            .store
            .get(namespace, &kubeconfig_name)
            .await?
            .ok_or_else(|| {
                ControllerError::NotYetAvailable(format!("kubeconfig secret {namespace}/{kubeconfig_name}"))
            })?;
        let payload = kubeconfig_payload(&kubeconfig)?;

        let remote = self.connector.connect(payload).await?;
        debug!("Connected to workload cluster {}/{}", namespace, cluster);

        remote.ensure_namespace(&registry.remote_namespace).await?;
        remote
            .upsert_secret(&portable_secret(&credentials, &registry.remote_namespace))
            .await?;
        let applied = remote.apply_manifest_url(&registry.addon_manifest_url).await?;

        info!(
            "Bootstrapped workload cluster {}/{}: credentials in {}, {} add-on objects applied",
            namespace, cluster, registry.remote_namespace, applied
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use remote_client::RemoteFailure;

    use super::*;
    use crate::test_utils::{credentials_secret, harness, kubeconfig_secret, registry, Harness, ADDON_URL, NAMESPACE};

    fn ready_harness() -> Harness {
        let h = harness();
        h.store.insert(&credentials_secret(&registry()));
        h.store.insert(&kubeconfig_secret("demo"));
        h
    }

    #[tokio::test]
    async fn copies_credentials_and_applies_addon() {
        let h = ready_harness();

        let applied = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap();

        assert_eq!(applied, 1);
        assert_eq!(h.remote.connections(), vec![b"apiVersion: v1\nkind: Config\n".to_vec()]);
        assert!(h.remote.namespaces().contains("bale-system"));
        assert_eq!(h.remote.applied_urls(), vec![ADDON_URL.to_string()]);

        let copied = h.remote.secret("bale-system", "bale-manager-credentials").unwrap();
        let source = credentials_secret(&registry());
        assert_eq!(copied.data, source.data);
        assert_eq!(copied.type_.as_deref(), Some("Opaque"));
        assert!(copied.metadata.uid.is_none());
        assert!(copied.metadata.resource_version.is_none());
        assert!(copied.metadata.labels.is_none());
    }

    #[tokio::test]
    async fn repeated_runs_converge() {
        let h = ready_harness();
        h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap();
        h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap();

        assert_eq!(h.remote.secret_count(), 1);
        assert_eq!(h.remote.namespaces().len(), 1);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn missing_kubeconfig_is_not_yet_available() {
        let h = harness();
        h.store.insert(&credentials_secret(&registry()));

        let err = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::NotYetAvailable(_)));
        assert!(err.is_retryable());
        assert!(h.remote.connections().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_is_not_yet_available() {
        let h = harness();
        h.store.insert(&kubeconfig_secret("demo"));

        let err = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::NotYetAvailable(_)));
    }

    #[tokio::test]
    async fn kubeconfig_without_value_key_is_a_config_error() {
        let h = harness();
        h.store.insert(&credentials_secret(&registry()));
        let mut secret = kubeconfig_secret("demo");
        secret.data = Some(Default::default());
        h.store.insert(&secret);

        let err = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_cluster_is_transient() {
        let h = ready_harness();
        h.remote.fail_with(Some(RemoteFailure::Unreachable));

        let err = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::TransientNetwork(_)));

        h.remote.fail_with(None);
        h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap();
        assert_eq!(h.remote.secret_count(), 1);
    }

    #[tokio::test]
    async fn manifest_outage_is_transient() {
        let h = ready_harness();
        h.remote.fail_with(Some(RemoteFailure::ManifestUnavailable));

        let err = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap_err();
        assert!(err.is_retryable());
        // Steps before the manifest still landed
        assert_eq!(h.remote.secret_count(), 1);
    }

    #[tokio::test]
    async fn rejected_kubeconfig_is_a_config_error() {
        let h = ready_harness();
        h.remote.fail_with(Some(RemoteFailure::InvalidKubeconfig));

        let err = h.reconciler.propagate_bootstrap(NAMESPACE, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
