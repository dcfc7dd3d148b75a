//! Defaulting and validation for Bale and Turtle writes.

use std::collections::HashSet;

use crds::{BaleSpec, TurtleSpec};

use super::versions::{default_node_pool_versions, validate_versions};
use crate::error::ControllerError;

pub fn default_turtle(spec: &mut TurtleSpec) -> bool {
    default_node_pool_versions(spec)
}

/// Defaults apply to the template so every stamped member starts valid.
pub fn default_bale(spec: &mut BaleSpec) -> bool {
    default_node_pool_versions(&mut spec.template)
}

pub fn validate_turtle(spec: &TurtleSpec) -> Result<(), ControllerError> {
    if spec.control_plane_replicas < 0 {
        return Err(ControllerError::Validation(format!(
            "controlPlaneReplicas must be >= 0, got {}",
            spec.control_plane_replicas
        )));
    }

    let mut seen = HashSet::new();
    for pool in &spec.hatchlings {
        if pool.name.trim().is_empty() {
            return Err(ControllerError::Validation(
                "node pool name must not be empty".to_string(),
            ));
        }
        if !seen.insert(pool.name.as_str()) {
            return Err(ControllerError::Validation(format!(
                "node pool name {:?} is used more than once",
                pool.name
            )));
        }
        if pool.replicas < 0 {
            return Err(ControllerError::Validation(format!(
                "node pool {:?} replicas must be >= 0, got {}",
                pool.name, pool.replicas
            )));
        }
    }

    validate_versions(spec)
}

/// Checks for a stored Turtle: the spec checks, plus its resource group
/// must be empty or its own name.
pub fn validate_named_turtle(name: &str, spec: &TurtleSpec) -> Result<(), ControllerError> {
    if !spec.resource_group.is_empty() && spec.resource_group != name {
        return Err(ControllerError::Validation(format!(
            "resourceGroup must be empty or {name:?}, got {:?}",
            spec.resource_group
        )));
    }
    validate_turtle(spec)
}

pub fn validate_bale(spec: &BaleSpec) -> Result<(), ControllerError> {
    if spec.replicas < 0 {
        return Err(ControllerError::Validation(format!(
            "replicas must be >= 0, got {}",
            spec.replicas
        )));
    }
    // Members are stamped with matchLabels and counted through them
    if spec.selector.match_labels.is_empty() {
        return Err(ControllerError::Validation(
            "selector.matchLabels must not be empty".to_string(),
        ));
    }
    if !spec.template.resource_group.is_empty() {
        return Err(ControllerError::Validation(
            "template.resourceGroup must be empty; each member gets its own".to_string(),
        ));
    }
    validate_turtle(&spec.template)
}
