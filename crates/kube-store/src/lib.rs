//! Kubernetes Object Store
//!
//! The narrow slice of the Kubernetes API the fleet controllers depend on:
//! typed get, label-selected list, create, optimistic-concurrency replace and
//! status patch. [`KubeStore`] talks to a real API server; the in-memory
//! `MockObjectStore` (feature `test-util`) stands in for it in unit tests.
//!
//! # Example
//!
//! ```no_run
//! use k8s_openapi::api::core::v1::Secret;
//! use kube_store::{KubeStore, ObjectStore};
//!
//! # async fn example(client: kube::Client) -> Result<(), kube_store::StoreError> {
//! let store = KubeStore::new(client);
//! let secret: Option<Secret> = store.get("bale-system", "bale-manager-credentials").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod kube_store;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::StoreError;
pub use kube_store::KubeStore;
pub use store_trait::{ObjectStore, StoreResource};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockObjectStore;
