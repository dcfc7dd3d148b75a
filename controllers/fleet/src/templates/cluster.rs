use crds::capi::{
    AzureCluster, AzureClusterSpec, Cluster, ClusterNetwork, ClusterSpec, NetworkRanges,
    NetworkSpec, ObjectReference, VnetSpec, CONTROL_PLANE_API_VERSION, INFRASTRUCTURE_API_VERSION,
};

use super::Parent;
use crate::config::CloudSettings;
use crate::naming;

pub const POD_CIDR: &str = "192.168.0.0/16";

/// The network shell tying control plane and infrastructure together
pub fn cluster(parent: &Parent<'_>) -> Cluster {
    Cluster {
        metadata: parent.child_meta(parent.name.clone(), &[]),
        spec: ClusterSpec {
            cluster_network: Some(ClusterNetwork {
                pods: Some(NetworkRanges {
                    cidr_blocks: vec![POD_CIDR.to_string()],
                }),
            }),
            control_plane_ref: Some(ObjectReference::new(
                CONTROL_PLANE_API_VERSION,
                "KubeadmControlPlane",
                parent.name.clone(),
            )),
            infrastructure_ref: Some(ObjectReference::new(
                INFRASTRUCTURE_API_VERSION,
                "AzureCluster",
                parent.name.clone(),
            )),
        },
    }
}

pub fn azure_cluster(parent: &Parent<'_>, cloud: &CloudSettings) -> AzureCluster {
    AzureCluster {
        metadata: parent.child_meta(parent.name.clone(), &[]),
        spec: AzureClusterSpec {
            location: parent.spec.location.clone(),
            resource_group: parent.resource_group().to_string(),
            subscription_id: Some(cloud.subscription_id.clone()).filter(|s| !s.is_empty()),
            network_spec: NetworkSpec {
                vnet: VnetSpec {
                    name: naming::vnet_name(&parent.name),
                },
            },
        },
    }
}
