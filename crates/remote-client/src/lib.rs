//! Remote Cluster Client
//!
//! Talks to a workload cluster the fleet controller has just composed, using
//! the kubeconfig Cluster API publishes for it. Offers exactly what the
//! bootstrap step needs: ensure a namespace, upsert a secret, and apply a
//! multi-document manifest fetched from a URL. All writes are server-side
//! applies, so every call is idempotent.
//!
//! # Example
//!
//! ```no_run
//! use remote_client::{KubeConnector, RemoteClusterConnector};
//!
//! # async fn example(kubeconfig: &[u8]) -> Result<(), remote_client::RemoteError> {
//! let connector = KubeConnector::new("bale-controller");
//! let cluster = connector.connect(kubeconfig).await?;
//! cluster.ensure_namespace("bale-system").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod manifest;
#[path = "trait.rs"]
pub mod remote_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{KubeConnector, KubeRemoteCluster};
pub use error::RemoteError;
pub use remote_trait::{RemoteCluster, RemoteClusterConnector};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockRemoteConnector, RemoteFailure};
