//! Bale CRD
//!
//! A fleet of equivalent Turtles: a desired count, a selector recognising the
//! members and the template every new member is stamped from.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::turtle::TurtleSpec;

fn default_replicas() -> i32 {
    1
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "infra.bale.dev",
    version = "v1alpha1",
    kind = "Bale",
    namespaced,
    status = "BaleStatus",
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Observed","type":"integer","jsonPath":".status.observedReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BaleSpec {
    /// Desired number of Turtles
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Selects the Turtles that belong to this fleet
    pub selector: FleetSelector,

    /// Azure subscription the fleet's clusters are billed to (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    /// Template copied into every new member
    pub template: TurtleSpec,
}

/// Label selector over Turtles in the fleet's namespace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FleetSelector {
    /// Exact-match labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectorRequirement {
    pub key: String,

    /// One of In, NotIn, Exists, DoesNotExist
    pub operator: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl From<&FleetSelector> for LabelSelector {
    fn from(selector: &FleetSelector) -> Self {
        LabelSelector {
            match_labels: if selector.match_labels.is_empty() {
                None
            } else {
                Some(selector.match_labels.clone())
            },
            match_expressions: if selector.match_expressions.is_empty() {
                None
            } else {
                Some(
                    selector
                        .match_expressions
                        .iter()
                        .map(|req| LabelSelectorRequirement {
                            key: req.key.clone(),
                            operator: req.operator.clone(),
                            values: if req.values.is_empty() {
                                None
                            } else {
                                Some(req.values.clone())
                            },
                        })
                        .collect(),
                )
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaleStatus {
    /// Members seen (plus those created) by the last scaling pass
    #[serde(default)]
    pub observed_replicas: i32,
}
