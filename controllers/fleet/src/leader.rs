//! Leader election over a coordination.k8s.io Lease.
//!
//! Acquisition and renewal are compare-and-swap writes keyed on the Lease's
//! resourceVersion: if another replica touched the Lease between our read and
//! our write, the write conflicts and we do not hold it. Only the replica
//! holding the Lease runs reconcilers.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::coordination::v1::Lease;
use kube_store::{ObjectStore, StoreError};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::ControllerError;

pub const LEASE_NAME: &str = "bale-controller-leader";

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// What to do with the Lease as last read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No Lease exists yet
    Create,
    /// We hold it; bump renewTime
    Renew,
    /// Held by someone whose renewal has lapsed
    TakeOver { transitions: i32 },
    /// Held by someone else and still fresh
    Wait,
}

fn micro_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decide how `identity` should treat `lease` at `now`.
pub fn decide(lease: Option<&Value>, identity: &str, now: DateTime<Utc>) -> Decision {
    let Some(lease) = lease else {
        return Decision::Create;
    };
    let spec = &lease["spec"];
    if spec["holderIdentity"].as_str() == Some(identity) {
        return Decision::Renew;
    }

    let renewed = spec["renewTime"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    let duration = spec["leaseDurationSeconds"].as_i64();
    let expired = match (renewed, duration) {
        (Some(renewed), Some(duration)) => now > renewed + chrono::Duration::seconds(duration),
        _ => true,
    };

    if expired {
        let transitions = spec["leaseTransitions"]
            .as_i64()
            .and_then(|t| i32::try_from(t).ok())
            .unwrap_or(0);
        Decision::TakeOver {
            transitions: transitions.saturating_add(1),
        }
    } else {
        Decision::Wait
    }
}

pub struct LeaderElector<S: ObjectStore> {
    store: S,
    namespace: String,
    identity: String,
}

impl<S: ObjectStore> LeaderElector<S> {
    pub fn new(store: S, namespace: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            identity: identity.into(),
        }
    }

    fn lease(
        &self,
        now: DateTime<Utc>,
        acquired: &str,
        transitions: i32,
        resource_version: Option<String>,
    ) -> Result<Lease, ControllerError> {
        let lease_seconds = i64::try_from(LEASE_DURATION.as_secs()).unwrap_or(i64::MAX);
        serde_json::from_value(json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": {
                "name": LEASE_NAME,
                "namespace": self.namespace,
                "resourceVersion": resource_version,
            },
            "spec": {
                "holderIdentity": self.identity,
                "leaseDurationSeconds": lease_seconds,
                "acquireTime": acquired,
                "renewTime": micro_time(now),
                "leaseTransitions": transitions,
            }
        }))
        .map_err(|e| ControllerError::Internal(format!("building Lease: {e}")))
    }

    /// One acquire-or-renew attempt; `Ok(true)` when we hold the Lease after it.
    pub async fn try_acquire_or_renew(&self, now: DateTime<Utc>) -> Result<bool, ControllerError> {
        let current: Option<Lease> = self.store.get(&self.namespace, LEASE_NAME).await?;
        let current = current
            .map(|lease| serde_json::to_value(&lease))
            .transpose()
            .map_err(|e| ControllerError::Internal(format!("reading Lease: {e}")))?;

        match decide(current.as_ref(), &self.identity, now) {
            Decision::Wait => Ok(false),
            Decision::Create => {
                let lease = self.lease(now, &micro_time(now), 0, None)?;
                match self.store.create(&lease).await {
                    Ok(_) => {
                        info!("{} created Lease {}/{}", self.identity, self.namespace, LEASE_NAME);
                        Ok(true)
                    }
                    Err(StoreError::AlreadyExists(_) | StoreError::Conflict(_)) => {
                        debug!("Lease {} created concurrently by another replica", LEASE_NAME);
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            decision => {
                let current = current.unwrap_or(Value::Null);
                let version = current["metadata"]["resourceVersion"].as_str().map(str::to_string);
                let (acquired, transitions) = match decision {
                    Decision::TakeOver { transitions } => (micro_time(now), transitions),
                    _ => (
                        current["spec"]["acquireTime"]
                            .as_str()
                            .map_or_else(|| micro_time(now), str::to_string),
                        current["spec"]["leaseTransitions"]
                            .as_i64()
                            .and_then(|t| i32::try_from(t).ok())
                            .unwrap_or(0),
                    ),
                };
                let lease = self.lease(now, &acquired, transitions, version)?;
                match self.store.replace(&lease).await {
                    Ok(_) => {
                        if matches!(decision, Decision::TakeOver { .. }) {
                            info!("{} took over expired Lease {}", self.identity, LEASE_NAME);
                        } else {
                            debug!("{} renewed Lease {}", self.identity, LEASE_NAME);
                        }
                        Ok(true)
                    }
                    Err(StoreError::Conflict(_) | StoreError::NotFound(_)) => {
                        debug!("Lease {} changed under us", LEASE_NAME);
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Block until the Lease is ours.
    pub async fn acquire(&self) {
        info!("{} waiting for Lease {}/{}", self.identity, self.namespace, LEASE_NAME);
        loop {
            match self.try_acquire_or_renew(Utc::now()).await {
                Ok(true) => {
                    info!("{} is now the leader", self.identity);
                    return;
                }
                Ok(false) => debug!("Lease {} held by another replica", LEASE_NAME),
                Err(e) => warn!("Lease {} acquisition failed: {}", LEASE_NAME, e),
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Keep renewing; returns an error as soon as leadership is lost.
    pub async fn hold(&self) -> Result<(), ControllerError> {
        loop {
            tokio::time::sleep(RENEW_INTERVAL).await;
            match self.try_acquire_or_renew(Utc::now()).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ControllerError::LeaderElection(format!(
                        "{} lost Lease {}",
                        self.identity, LEASE_NAME
                    )));
                }
                Err(e) => {
                    return Err(ControllerError::LeaderElection(format!(
                        "{} could not renew Lease {}: {e}",
                        self.identity, LEASE_NAME
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kube_store::MockObjectStore;

    use super::*;

    const NS: &str = "bale-system";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn holder(store: &MockObjectStore) -> Value {
        let lease: Lease = store.object(NS, LEASE_NAME).unwrap();
        serde_json::to_value(lease).unwrap()["spec"].clone()
    }

    #[test]
    fn decide_covers_every_case() {
        assert_eq!(decide(None, "a", at(0)), Decision::Create);

        let lease = json!({ "spec": {
            "holderIdentity": "a",
            "leaseDurationSeconds": 30,
            "renewTime": micro_time(at(0)),
            "leaseTransitions": 2
        }});
        assert_eq!(decide(Some(&lease), "a", at(100)), Decision::Renew);
        assert_eq!(decide(Some(&lease), "b", at(10)), Decision::Wait);
        assert_eq!(decide(Some(&lease), "b", at(31)), Decision::TakeOver { transitions: 3 });
        assert_eq!(
            decide(Some(&json!({ "spec": {} })), "b", at(0)),
            Decision::TakeOver { transitions: 1 }
        );
    }

    #[tokio::test]
    async fn first_replica_creates_and_second_waits() {
        let store = MockObjectStore::new();
        let a = LeaderElector::new(store.clone(), NS, "a");
        let b = LeaderElector::new(store.clone(), NS, "b");

        assert!(a.try_acquire_or_renew(at(0)).await.unwrap());
        assert!(!b.try_acquire_or_renew(at(5)).await.unwrap());
        assert_eq!(holder(&store)["holderIdentity"], "a");
    }

    #[tokio::test]
    async fn holder_renews() {
        let store = MockObjectStore::new();
        let a = LeaderElector::new(store.clone(), NS, "a");
        assert!(a.try_acquire_or_renew(at(0)).await.unwrap());
        assert!(a.try_acquire_or_renew(at(10)).await.unwrap());

        let spec = holder(&store);
        let renewed = DateTime::parse_from_rfc3339(spec["renewTime"].as_str().unwrap()).unwrap();
        assert_eq!(renewed.with_timezone(&Utc), at(10));
        assert_eq!(spec["leaseTransitions"], 0);
    }

    #[tokio::test]
    async fn lapsed_lease_is_taken_over() {
        let store = MockObjectStore::new();
        let a = LeaderElector::new(store.clone(), NS, "a");
        let b = LeaderElector::new(store.clone(), NS, "b");
        assert!(a.try_acquire_or_renew(at(0)).await.unwrap());

        assert!(b.try_acquire_or_renew(at(45)).await.unwrap());
        let spec = holder(&store);
        assert_eq!(spec["holderIdentity"], "b");
        assert_eq!(spec["leaseTransitions"], 1);

        // The old holder finds it gone on its next renewal
        assert!(!a.try_acquire_or_renew(at(46)).await.unwrap());
    }

    #[tokio::test]
    async fn racing_write_loses() {
        let store = MockObjectStore::new();
        let a = LeaderElector::new(store.clone(), NS, "a");
        assert!(a.try_acquire_or_renew(at(0)).await.unwrap());

        store.inject_conflicts::<Lease>(1);
        assert!(!a.try_acquire_or_renew(at(10)).await.unwrap());
    }
}
