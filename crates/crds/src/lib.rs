//! Bale CRD Definitions
//!
//! Custom resources served by the fleet controller (`Bale`, `Turtle`) and the
//! Cluster API objects a `Turtle` is composed into.

pub mod bale;
pub mod capi;
pub mod turtle;

pub use bale::*;
pub use capi::*;
pub use turtle::*;

/// API group of the fleet resources
pub const API_GROUP: &str = "infra.bale.dev";

/// Label stamped on every Turtle created for a fleet, naming the fleet
pub const FLEET_LABEL: &str = "infra.bale.dev/fleet";
