//! Reconciliation logic for Bale and Turtle resources.
//!
//! - `fleet`: scales a Bale by stamping new Turtles from its template
//! - `cluster`: composes a Turtle into Cluster API resources, stage by stage
//! - `remote`: seeds a composed cluster with credentials and the CNI add-on

pub mod cluster;
pub mod fleet;
pub mod remote;

use std::sync::Arc;

use kube_store::{ObjectStore, StoreResource};
use remote_client::RemoteClusterConnector;

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::naming::NamingService;
use crate::registry::Registry;
use crate::sync::{self, Mutation, SyncOutcome};

/// Reconciles Bales and Turtles against an object store.
pub struct Reconciler<S: ObjectStore> {
    pub(crate) store: S,
    pub(crate) connector: Arc<dyn RemoteClusterConnector>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) naming: NamingService,
    pub(crate) metrics: Arc<Metrics>,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(
        store: S,
        connector: Arc<dyn RemoteClusterConnector>,
        registry: Arc<Registry>,
        naming: NamingService,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            connector,
            registry,
            naming,
            metrics,
        }
    }

    /// Upsert one child and count the outcome.
    pub(crate) async fn sync_child<K: StoreResource>(
        &self,
        desired: &K,
        mutate: Mutation<K>,
    ) -> Result<(K, SyncOutcome), ControllerError> {
        let (obj, outcome) = sync::create_or_update(&self.store, desired, mutate).await?;
        self.metrics
            .child_writes_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        Ok((obj, outcome))
    }
}
