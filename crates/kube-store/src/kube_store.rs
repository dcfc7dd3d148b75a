//! ObjectStore backed by the Kubernetes API server

use std::fmt;

use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::Selector;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use crate::error::StoreError;
use crate::store_trait::{ObjectStore, StoreResource};

/// [`ObjectStore`] over a `kube::Client`
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: StoreResource>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of<K: StoreResource>(obj: &K) -> Result<String, StoreError> {
        obj.namespace().ok_or_else(|| StoreError::Api {
            code: 422,
            message: format!("{} {} has no namespace", K::kind(&()), obj.name_any()),
        })
    }
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: StoreResource>(&self, namespace: &str, selector: &Selector) -> Result<Vec<K>, StoreError> {
        let params = ListParams::default().labels_from(selector);
        let list = self.api::<K>(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create<K: StoreResource>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = Self::namespace_of(obj)?;
        debug!("Creating {} {}/{}", K::kind(&()), namespace, obj.name_any());
        Ok(self.api::<K>(&namespace).create(&PostParams::default(), obj).await?)
    }

    async fn replace<K: StoreResource>(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = Self::namespace_of(obj)?;
        let name = obj.name_any();
        debug!("Replacing {} {}/{}", K::kind(&()), namespace, name);
        Ok(self
            .api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await?)
    }

    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), StoreError> {
        let patch = json!({ "status": status });
        self.api::<K>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
