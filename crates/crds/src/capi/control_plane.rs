//! `controlplane.cluster.x-k8s.io` KubeadmControlPlane

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{KubeadmConfigSpec, ObjectReference};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "KubeadmControlPlane",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneSpec {
    pub replicas: i32,

    pub version: String,

    pub machine_template: ControlPlaneMachineTemplate,

    pub kubeadm_config_spec: KubeadmConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneMachineTemplate {
    pub infrastructure_ref: ObjectReference,
}
