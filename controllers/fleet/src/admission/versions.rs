//! Node pool version defaulting and ordering.
//!
//! A node pool may never run a newer Kubernetes version than its control
//! plane. Unset pool versions inherit the control plane's.

use crds::TurtleSpec;
use semver::Version;

use crate::error::ControllerError;

/// Fill unset pool versions from the control plane. Returns whether
/// anything changed.
pub fn default_node_pool_versions(spec: &mut TurtleSpec) -> bool {
    let mut changed = false;
    for pool in &mut spec.hatchlings {
        if pool.version.as_deref().map_or(true, |v| v.trim().is_empty()) {
            pool.version = Some(spec.version.clone());
            changed = true;
        }
    }
    changed
}

/// Parse `1.18.0` or `v1.18.0`.
pub fn parse_version(raw: &str) -> Result<Version, ControllerError> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare)
        .map_err(|e| ControllerError::Internal(format!("version {raw:?} is not semantic: {e}")))
}

/// Reject pools whose explicit version is newer than the control plane.
/// Unparsable versions are an internal error, not a validation failure.
pub fn validate_versions(spec: &TurtleSpec) -> Result<(), ControllerError> {
    let pools: Vec<_> = spec
        .hatchlings
        .iter()
        .filter_map(|p| p.version.as_deref().map(|v| (p, v)))
        .filter(|(_, v)| !v.trim().is_empty())
        .collect();
    if pools.is_empty() {
        return Ok(());
    }

    let control_plane = parse_version(&spec.version)?;
    for (pool, raw) in pools {
        let version = parse_version(raw)?;
        if control_plane < version {
            return Err(ControllerError::Validation(format!(
                "node pool {:?} version {} is newer than control plane version {}",
                pool.name, raw, spec.version
            )));
        }
    }
    Ok(())
}
