//! Machine templates and deployments.

use std::collections::BTreeMap;

use crds::capi::{
    AzureMachineSpec, AzureMachineTemplate, AzureMachineTemplateResource, AzureMachineTemplateSpec,
    MachineBootstrap, MachineDeployment, MachineDeploymentSpec, MachineSelector, MachineSpec,
    MachineTemplateMetadata, MachineTemplateSpec, ManagedDisk, ObjectReference, OsDisk,
    BOOTSTRAP_API_VERSION, CLUSTER_NAME_LABEL, DEPLOYMENT_NAME_LABEL, INFRASTRUCTURE_API_VERSION,
};
use crds::HatchlingSpec;

use super::{normalize_version, Parent};
use crate::naming;

const OS_TYPE: &str = "Linux";
const STORAGE_ACCOUNT_TYPE: &str = "Premium_LRS";
const CONTROL_PLANE_DISK_GB: i32 = 128;

fn machine_template(parent: &Parent<'_>, name: String, vm_size: &str, disk_gb: i32) -> AzureMachineTemplate {
    AzureMachineTemplate {
        metadata: parent.child_meta(name, &[]),
        spec: AzureMachineTemplateSpec {
            template: AzureMachineTemplateResource {
                spec: AzureMachineSpec {
                    vm_size: vm_size.to_string(),
                    os_disk: OsDisk {
                        os_type: OS_TYPE.to_string(),
                        disk_size_gb: disk_gb,
                        managed_disk: ManagedDisk {
                            storage_account_type: STORAGE_ACCOUNT_TYPE.to_string(),
                        },
                    },
                },
            },
        },
    }
}

pub fn control_plane_template(parent: &Parent<'_>) -> AzureMachineTemplate {
    machine_template(
        parent,
        naming::control_plane_template_name(&parent.name),
        &parent.spec.control_plane_vm_size,
        CONTROL_PLANE_DISK_GB,
    )
}

pub fn pool_template(parent: &Parent<'_>, pool: &HatchlingSpec) -> AzureMachineTemplate {
    machine_template(
        parent,
        naming::pool_name(&parent.name, &pool.name),
        &pool.vm_size,
        pool.os_disk_size_gb,
    )
}

pub fn pool_deployment(parent: &Parent<'_>, pool: &HatchlingSpec) -> MachineDeployment {
    let name = naming::pool_name(&parent.name, &pool.name);
    let selector_labels = BTreeMap::from([
        (CLUSTER_NAME_LABEL.to_string(), parent.name.clone()),
        (DEPLOYMENT_NAME_LABEL.to_string(), name.clone()),
    ]);
    // Unset pool versions are defaulted at admission; fall back for objects
    // written before the webhook was installed.
    let version = pool.version.as_deref().unwrap_or(&parent.spec.version);

    MachineDeployment {
        metadata: parent.child_meta(name.clone(), &[]),
        spec: MachineDeploymentSpec {
            cluster_name: parent.name.clone(),
            replicas: pool.replicas,
            selector: MachineSelector {
                match_labels: selector_labels.clone(),
            },
            template: MachineTemplateSpec {
                metadata: MachineTemplateMetadata {
                    labels: selector_labels,
                },
                spec: MachineSpec {
                    cluster_name: parent.name.clone(),
                    bootstrap: MachineBootstrap {
                        config_ref: ObjectReference::new(
                            BOOTSTRAP_API_VERSION,
                            "KubeadmConfigTemplate",
                            parent.name.clone(),
                        ),
                    },
                    infrastructure_ref: ObjectReference::new(
                        INFRASTRUCTURE_API_VERSION,
                        "AzureMachineTemplate",
                        name,
                    ),
                    version: Some(normalize_version(version)),
                },
            },
        },
    }
}
