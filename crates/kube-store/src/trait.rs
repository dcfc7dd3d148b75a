//! ObjectStore trait for mocking
//!
//! Controllers are written against this trait; [`crate::KubeStore`] implements
//! it over `kube::Api` and tests use the in-memory mock.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::core::Selector;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Namespaced resource types the store can carry
pub trait StoreResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed access to namespaced objects
///
/// All methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get<K: StoreResource>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    /// List objects in a namespace whose labels match `selector`
    async fn list<K: StoreResource>(&self, namespace: &str, selector: &Selector) -> Result<Vec<K>, StoreError>;

    /// Create an object; the namespace is taken from its metadata
    async fn create<K: StoreResource>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object. A stale `metadata.resourceVersion` yields
    /// [`StoreError::Conflict`].
    async fn replace<K: StoreResource>(&self, obj: &K) -> Result<K, StoreError>;

    /// Merge `status` into the object's status subresource
    async fn patch_status<K: StoreResource>(
        &self,
        namespace: &str,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), StoreError>;
}
