//! Turtle CRD
//!
//! One workload cluster's desired state: location, control plane and the
//! node pools ("hatchlings") that join it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_replicas() -> i32 {
    1
}

fn default_control_plane_vm_size() -> String {
    "Standard_D2s_v3".to_string()
}

fn default_os_disk_size_gb() -> i32 {
    512
}

fn default_vm_size() -> String {
    "Standard_D8s_v3".to_string()
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infra.bale.dev",
    version = "v1alpha1",
    kind = "Turtle",
    namespaced,
    status = "TurtleStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Location","type":"string","jsonPath":".spec.location"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TurtleSpec {
    /// Azure region the cluster is placed in (e.g. "eastus")
    pub location: String,

    /// Azure resource group holding the cluster's infrastructure. Always
    /// the Turtle's own name; may be left empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_group: String,

    /// Number of control plane machines
    #[serde(default = "default_replicas")]
    pub control_plane_replicas: i32,

    /// VM size for control plane machines
    #[serde(default = "default_control_plane_vm_size")]
    pub control_plane_vm_size: String,

    /// Kubernetes version of the control plane (semver, optional leading "v")
    pub version: String,

    /// Node pools, in order
    #[serde(default)]
    pub hatchlings: Vec<HatchlingSpec>,
}

/// A named group of worker nodes sharing size, disk, version and count.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HatchlingSpec {
    /// Pool name, unique within the Turtle
    pub name: String,

    /// OS disk size in GB
    #[serde(default = "default_os_disk_size_gb", rename = "osDiskSizeGB")]
    pub os_disk_size_gb: i32,

    /// Number of worker machines
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Kubernetes version; defaulted to the control plane version at admission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Azure VM size
    #[serde(default = "default_vm_size")]
    pub vm_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurtleStatus {
    /// Overall composition phase
    #[serde(default)]
    pub phase: TurtlePhase,

    /// Result of each composition stage from the last pass, in pipeline order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    /// Stage name (e.g. "controlPlane")
    pub name: String,

    pub state: StageState,

    /// Failure reason, or a short note for skipped stages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum TurtlePhase {
    /// Not yet composed, or composition still converging
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Every stage succeeded on the last pass
    #[serde(alias = "provisioned")]
    Provisioned,

    /// A stage failed on the last pass and retrying alone will not fix it
    #[serde(alias = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum StageState {
    #[serde(alias = "succeeded")]
    Succeeded,
    #[serde(alias = "skipped")]
    Skipped,
    #[serde(alias = "failed")]
    Failed,
}
