//! Turtle to Cluster API translation.
//!
//! Pure functions: a Turtle plus the cloud settings map to the full set of
//! child resources. Every child name derives from the Turtle's name (and pool
//! name), every child carries the cluster-name label and a controller owner
//! reference back to the Turtle, and no randomness or clock reading enters
//! the output, so composing twice yields identical objects.

pub mod bootstrap;
pub mod cloud_config;
pub mod cluster;
pub mod machines;

use std::collections::BTreeMap;

use crds::capi::{
    AzureCluster, AzureMachineTemplate, Cluster, KubeadmConfigTemplate, KubeadmControlPlane,
    MachineDeployment, CLUSTER_NAME_LABEL,
};
use crds::{Turtle, TurtleSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::config::CloudSettings;
use crate::error::ControllerError;

pub use cloud_config::CloudProviderConfig;

/// Everything one Turtle composes into
#[derive(Debug, Clone)]
pub struct ChildResourceSet {
    pub cluster: Cluster,
    pub bootstrap: KubeadmConfigTemplate,
    pub control_plane_template: AzureMachineTemplate,
    pub control_plane: KubeadmControlPlane,
    /// One per node pool, in pool order
    pub pool_templates: Vec<AzureMachineTemplate>,
    /// One per node pool, in pool order
    pub pool_deployments: Vec<MachineDeployment>,
    pub azure_cluster: AzureCluster,
}

impl ChildResourceSet {
    pub fn compose(turtle: &Turtle, cloud: &CloudSettings) -> Result<Self, ControllerError> {
        let parent = Parent::of(turtle)?;
        let cloud_config = parent.cloud_provider_config(cloud).render()?;

        let (pool_templates, pool_deployments) = turtle
            .spec
            .hatchlings
            .iter()
            .map(|pool| (machines::pool_template(&parent, pool), machines::pool_deployment(&parent, pool)))
            .unzip();

        Ok(ChildResourceSet {
            cluster: cluster::cluster(&parent),
            bootstrap: bootstrap::config_template(&parent, &cloud_config),
            control_plane_template: machines::control_plane_template(&parent),
            control_plane: bootstrap::control_plane(&parent, &cloud_config),
            pool_templates,
            pool_deployments,
            azure_cluster: cluster::azure_cluster(&parent, cloud),
        })
    }
}

/// The Turtle as seen by the template functions
pub struct Parent<'a> {
    pub name: String,
    pub namespace: String,
    pub spec: &'a TurtleSpec,
    owner: OwnerReference,
}

impl<'a> Parent<'a> {
    pub fn of(turtle: &'a Turtle) -> Result<Self, ControllerError> {
        let name = turtle.name_any();
        let namespace = turtle
            .namespace()
            .ok_or_else(|| ControllerError::Internal(format!("Turtle {name} has no namespace")))?;
        let owner = turtle.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::Internal(format!("Turtle {namespace}/{name} has no uid yet"))
        })?;
        Ok(Parent {
            name,
            namespace,
            spec: &turtle.spec,
            owner,
        })
    }

    /// A cluster's infrastructure lives in a resource group named after it
    pub fn resource_group(&self) -> &str {
        &self.name
    }

    pub fn cloud_provider_config(&self, cloud: &CloudSettings) -> CloudProviderConfig {
        CloudProviderConfig::new(&self.name, self.resource_group(), &self.spec.location, cloud)
    }

    /// Metadata for a child called `name`, with any extra labels
    pub fn child_meta(&self, name: String, extra_labels: &[(&str, &str)]) -> ObjectMeta {
        let mut labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), self.name.clone())]);
        for (k, v) in extra_labels {
            labels.insert(k.to_string(), v.to_string());
        }
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(labels),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }
}

/// Cluster API expects versions with a leading "v".
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    if trimmed.starts_with('v') {
        trimmed.to_string()
    } else {
        format!("v{trimmed}")
    }
}

#[cfg(test)]
#[path = "templates_test.rs"]
mod tests;
