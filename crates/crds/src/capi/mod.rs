//! Cluster API child resources
//!
//! Typed shapes of the Cluster API (core, kubeadm bootstrap, kubeadm control
//! plane) and Azure provider objects a Turtle is composed into. Only the
//! fields the composer writes are modelled; the upstream controllers own the
//! rest of each object.

pub mod azure;
pub mod bootstrap;
pub mod cluster;
pub mod control_plane;

pub use azure::*;
pub use bootstrap::*;
pub use cluster::*;
pub use control_plane::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label Cluster API uses to tie machines and templates to their cluster
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label Cluster API uses to tie machines to their MachineDeployment
pub const DEPLOYMENT_NAME_LABEL: &str = "cluster.x-k8s.io/deployment-name";

pub const CAPI_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
pub const BOOTSTRAP_API_VERSION: &str = "bootstrap.cluster.x-k8s.io/v1beta1";
pub const CONTROL_PLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta1";
pub const INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";

/// Reference to another object in the same namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectReference {
    pub fn new(api_version: &str, kind: &str, name: impl Into<String>) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.into(),
            namespace: None,
        }
    }
}
