//! Kubeadm configuration shared by control plane and worker bootstrap.

use std::collections::BTreeMap;

use crds::capi::{
    ApiServer, BootstrapFile, ClusterConfiguration, ControlPlaneComponent, ControlPlaneMachineTemplate,
    HostPathMount, KubeadmConfigSpec, KubeadmConfigTemplate, KubeadmConfigTemplateResource,
    KubeadmConfigTemplateSpec, KubeadmControlPlane, KubeadmControlPlaneSpec, NodeConfiguration,
    NodeRegistration, ObjectReference, INFRASTRUCTURE_API_VERSION,
};

use super::cloud_config::CLOUD_CONFIG_PATH;
use super::{normalize_version, Parent};
use crate::naming;

/// Resolved by cloud-init on the node itself
pub const NODE_NAME_PLACEHOLDER: &str = r#"{{ ds.meta_data["local_hostname"] }}"#;
pub const CONTROL_PLANE_TIMEOUT: &str = "20m0s";

fn cloud_args() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("cloud-config".to_string(), CLOUD_CONFIG_PATH.to_string()),
        ("cloud-provider".to_string(), "azure".to_string()),
    ])
}

fn cloud_config_mount() -> HostPathMount {
    HostPathMount {
        name: "cloud-config".to_string(),
        host_path: CLOUD_CONFIG_PATH.to_string(),
        mount_path: CLOUD_CONFIG_PATH.to_string(),
        read_only: true,
    }
}

fn node_configuration() -> NodeConfiguration {
    NodeConfiguration {
        node_registration: NodeRegistration {
            name: NODE_NAME_PLACEHOLDER.to_string(),
            kubelet_extra_args: cloud_args(),
        },
    }
}

/// Kubeadm settings with `cloud_config` embedded as the azure.json file
pub fn kubeadm_config_spec(cloud_config: &str) -> KubeadmConfigSpec {
    let mut controller_manager_args = cloud_args();
    controller_manager_args.insert("allocate-node-cidrs".to_string(), "false".to_string());

    KubeadmConfigSpec {
        cluster_configuration: Some(ClusterConfiguration {
            api_server: ApiServer {
                extra_args: cloud_args(),
                extra_volumes: vec![cloud_config_mount()],
                timeout_for_control_plane: Some(CONTROL_PLANE_TIMEOUT.to_string()),
            },
            controller_manager: ControlPlaneComponent {
                extra_args: controller_manager_args,
                extra_volumes: vec![cloud_config_mount()],
            },
        }),
        init_configuration: Some(node_configuration()),
        join_configuration: Some(node_configuration()),
        files: vec![BootstrapFile {
            path: CLOUD_CONFIG_PATH.to_string(),
            owner: "root:root".to_string(),
            permissions: "0644".to_string(),
            content: cloud_config.to_string(),
        }],
        use_experimental_retry_join: true,
    }
}

pub fn config_template(parent: &Parent<'_>, cloud_config: &str) -> KubeadmConfigTemplate {
    KubeadmConfigTemplate {
        metadata: parent.child_meta(parent.name.clone(), &[]),
        spec: KubeadmConfigTemplateSpec {
            template: KubeadmConfigTemplateResource {
                spec: kubeadm_config_spec(cloud_config),
            },
        },
    }
}

pub fn control_plane(parent: &Parent<'_>, cloud_config: &str) -> KubeadmControlPlane {
    KubeadmControlPlane {
        metadata: parent.child_meta(parent.name.clone(), &[]),
        spec: KubeadmControlPlaneSpec {
            replicas: parent.spec.control_plane_replicas,
            version: normalize_version(&parent.spec.version),
            machine_template: ControlPlaneMachineTemplate {
                infrastructure_ref: ObjectReference::new(
                    INFRASTRUCTURE_API_VERSION,
                    "AzureMachineTemplate",
                    naming::control_plane_template_name(&parent.name),
                ),
            },
            kubeadm_config_spec: kubeadm_config_spec(cloud_config),
        },
    }
}
