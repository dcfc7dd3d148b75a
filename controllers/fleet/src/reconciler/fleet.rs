//! Fleet scaling.
//!
//! A Bale's members are the Turtles in its namespace matching its selector.
//! When fewer exist than desired, new members are stamped from the template
//! under fresh random names. Members are never deleted here: scale-down is
//! not implemented.

use std::collections::BTreeMap;

use crds::{Bale, Turtle, FLEET_LABEL};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use kube::core::{Selector, SelectorExt};
use kube::{Resource, ResourceExt};
use kube_store::ObjectStore;
use serde_json::json;
use tracing::{debug, info, warn};

use super::Reconciler;
use crate::error::ControllerError;
use crate::sync;

/// Fresh names tried per member before giving up on collisions
const NAME_ATTEMPTS: usize = 3;

/// Resolve a Bale's selector.
pub fn fleet_selector(bale: &Bale) -> Result<Selector, ControllerError> {
    Selector::try_from(LabelSelector::from(&bale.spec.selector)).map_err(|e| {
        ControllerError::InvalidConfig(format!(
            "Bale {} has an invalid selector: {e}",
            bale.name_any()
        ))
    })
}

/// Labels stamped on every member: the selector's matchLabels plus the
/// fleet name.
pub fn member_labels(bale: &Bale) -> BTreeMap<String, String> {
    let mut labels = bale.spec.selector.match_labels.clone();
    labels.insert(FLEET_LABEL.to_string(), bale.name_any());
    labels
}

/// A new member named `name`, its resource group set to its own name.
pub fn member_turtle(
    bale: &Bale,
    name: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    owner: &OwnerReference,
) -> Turtle {
    let mut spec = bale.spec.template.clone();
    spec.resource_group = name.to_string();
    let mut turtle = Turtle::new(name, spec);
    turtle.metadata.namespace = Some(namespace.to_string());
    turtle.metadata.labels = Some(labels.clone());
    turtle.metadata.owner_references = Some(vec![owner.clone()]);
    turtle
}

impl<S: ObjectStore> Reconciler<S> {
    /// Bring a Bale's member count up to its desired replicas.
    pub async fn reconcile_bale(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling Bale {}/{}", namespace, name);

        let Some(bale) = self.store.get::<Bale>(namespace, name).await? else {
            debug!("Bale {}/{} no longer exists", namespace, name);
            return Ok(());
        };

        let desired = bale.spec.replicas;
        if desired < 0 {
            return Err(ControllerError::InvalidConfig(format!(
                "Bale {namespace}/{name} wants {desired} replicas"
            )));
        }

        let selector = fleet_selector(&bale)?;
        let labels = member_labels(&bale);
        if !selector.matches(&labels) {
            return Err(ControllerError::InvalidConfig(format!(
                "Bale {namespace}/{name}: members would not match the fleet selector"
            )));
        }

        let members: Vec<Turtle> = self.store.list(namespace, &selector).await?;
        let observed = i32::try_from(members.len()).unwrap_or(i32::MAX);
        let diff = i64::from(desired) - i64::from(observed);

        let mut created = 0;
        let scaled = if diff > 0 {
            info!(
                "Bale {}/{}: {} of {} members exist, creating {}",
                namespace, name, observed, desired, diff
            );
            self.scale_up(&bale, namespace, diff, &labels, &mut created).await
        } else {
            if diff < 0 {
                warn!(
                    "Bale {}/{} has {} members but wants {}; scale-down is not implemented",
                    namespace, name, observed, desired
                );
            } else {
                debug!("Bale {}/{} has all {} members", namespace, name, desired);
            }
            Ok(())
        };

        let status = self.update_bale_status(&bale, observed.saturating_add(created)).await;
        scaled?;
        status
    }

    async fn scale_up(
        &self,
        bale: &Bale,
        namespace: &str,
        count: i64,
        labels: &BTreeMap<String, String>,
        created: &mut i32,
    ) -> Result<(), ControllerError> {
        let owner = bale.controller_owner_ref(&()).ok_or_else(|| {
            ControllerError::Internal(format!("Bale {namespace}/{} has no uid", bale.name_any()))
        })?;

        for _ in 0..count {
            let member = self
                .create_member(bale, namespace, labels, &owner)
                .await
                .map_err(|e| e.in_stage("scaleUp"))?;
            info!("Created Turtle {}/{} for Bale {}", namespace, member, bale.name_any());
            self.metrics.turtles_created_total.inc();
            *created += 1;
        }
        Ok(())
    }

    async fn create_member(
        &self,
        bale: &Bale,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        owner: &OwnerReference,
    ) -> Result<String, ControllerError> {
        let mut last = None;
        for _ in 0..NAME_ATTEMPTS {
            let name = self.naming.fleet_member_name()?;
            let member = member_turtle(bale, &name, namespace, labels, owner);
            match self.sync_child(&member, sync::refuse_existing).await {
                Ok(_) => return Ok(name),
                Err(ControllerError::Conflict(msg)) => {
                    warn!("Generated name {} is taken, drawing another", name);
                    last = Some(msg);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ControllerError::Conflict(format!(
            "no free member name after {NAME_ATTEMPTS} attempts: {}",
            last.unwrap_or_default()
        )))
    }

    async fn update_bale_status(&self, bale: &Bale, observed: i32) -> Result<(), ControllerError> {
        let current = bale.status.as_ref().map(|s| s.observed_replicas);
        if current == Some(observed) {
            return Ok(());
        }
        let namespace = bale.namespace().unwrap_or_default();
        self.store
            .patch_status::<Bale>(&namespace, &bale.name_any(), json!({ "observedReplicas": observed }))
            .await?;
        debug!("Bale {}/{} observedReplicas = {}", namespace, bale.name_any(), observed);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fleet_test.rs"]
mod tests;
