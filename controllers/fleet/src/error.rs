//! Controller-specific error types.
//!
//! `ControllerError` is what every reconcile pass and admission check returns.
//! Its variants follow the failure classes the dispatcher cares about: benign
//! absence, optimistic-concurrency collisions, rejected input, malformed
//! input, and conditions that clear up on their own.

use std::time::Duration;

use kube::Error as KubeError;
use kube_store::StoreError;
use remote_client::RemoteError;
use thiserror::Error;

use crate::naming::NamingError;

/// Errors that can occur in the fleet controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object absent on a path where it must exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency collision that outlived the upsert retries
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Admission-time invariant violation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Input that should be structurally impossible (e.g. unparsable version)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Remote cluster or manifest URL unreachable
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// A precondition produced by another actor has not appeared yet
    #[error("Not yet available: {0}")]
    NotYetAvailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Random name generation failed
    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    /// A composition stage failed
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ControllerError>,
    },

    /// Object store error not covered by the classes above
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Remote cluster error not covered by the classes above
    #[error("Remote cluster error: {0}")]
    Remote(RemoteError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Leader election lease lost or unobtainable
    #[error("Leader election: {0}")]
    LeaderElection(String),
}

impl ControllerError {
    /// Wrap with the name of the composition stage that produced it.
    pub fn in_stage(self, stage: &'static str) -> Self {
        ControllerError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &ControllerError {
        match self {
            ControllerError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether requeueing without a spec change can make progress.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            ControllerError::Conflict(_)
            | ControllerError::TransientNetwork(_)
            | ControllerError::NotYetAvailable(_)
            | ControllerError::Naming(_)
            | ControllerError::Kube(_)
            | ControllerError::Watch(_) => true,
            ControllerError::Store(e) => !matches!(e, StoreError::Serialization(_)),
            ControllerError::Remote(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Delay before the dispatcher retries the object.
    pub fn requeue_after(&self) -> Duration {
        match self.root() {
            ControllerError::Conflict(_) => Duration::from_secs(5),
            ControllerError::TransientNetwork(_) => Duration::from_secs(15),
            ControllerError::NotYetAvailable(_) => Duration::from_secs(30),
            ControllerError::Validation(_)
            | ControllerError::Internal(_)
            | ControllerError::InvalidConfig(_) => Duration::from_secs(300),
            _ => Duration::from_secs(15),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            ControllerError::NotFound(_) => "not_found",
            ControllerError::Conflict(_) => "conflict",
            ControllerError::Validation(_) => "validation",
            ControllerError::Internal(_) => "internal",
            ControllerError::TransientNetwork(_) => "transient_network",
            ControllerError::NotYetAvailable(_) => "not_yet_available",
            ControllerError::InvalidConfig(_) => "invalid_config",
            ControllerError::Naming(_) => "naming",
            ControllerError::Store(_) => "store",
            ControllerError::Remote(_) => "remote",
            ControllerError::Kube(_) => "kube",
            ControllerError::Watch(_) => "watch",
            ControllerError::LeaderElection(_) => "leader_election",
            ControllerError::Stage { .. } => "stage",
        }
    }
}

impl From<StoreError> for ControllerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => ControllerError::NotFound(msg),
            StoreError::Conflict(msg) => ControllerError::Conflict(msg),
            StoreError::Transport(msg) => ControllerError::TransientNetwork(msg),
            other => ControllerError::Store(other),
        }
    }
}

impl From<RemoteError> for ControllerError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unreachable(msg) | RemoteError::ManifestFetch(msg) => {
                ControllerError::TransientNetwork(msg)
            }
            RemoteError::InvalidKubeconfig(msg) => ControllerError::InvalidConfig(msg),
            other => ControllerError::Remote(other),
        }
    }
}
