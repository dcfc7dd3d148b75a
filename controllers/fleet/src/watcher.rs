//! Kubernetes resource watchers.
//!
//! One kube-runtime `Controller` per custom resource. The Bale controller
//! also wakes on changes to the Turtles it owns; the Turtle controller wakes
//! on changes to any of its Cluster API children, so a deleted or edited
//! child is put back on the next pass.

use std::sync::Arc;
use std::time::Duration;

use crds::capi::{
    AzureCluster, AzureMachineTemplate, Cluster, KubeadmConfigTemplate, KubeadmControlPlane,
    MachineDeployment,
};
use crds::{Bale, Turtle};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use kube_store::KubeStore;
use tracing::{debug, error, info};

use crate::error::ControllerError;
use crate::reconciler::Reconciler;

/// Composed Turtles are revisited this often even without events
const TURTLE_RESYNC: Duration = Duration::from_secs(300);

type Context = Reconciler<KubeStore>;

fn controller_config() -> ControllerConfig {
    ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3)
}

fn error_policy<K>(obj: Arc<K>, error: &ControllerError, _ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    error!(
        "Reconciliation of {} {}/{} failed: {}",
        K::kind(&()),
        obj.namespace().unwrap_or_default(),
        obj.name_any(),
        error
    );
    Action::requeue(error.requeue_after())
}

async fn on_bale(bale: Arc<Bale>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = bale.namespace().unwrap_or_default();
    let result = ctx.reconcile_bale(&namespace, &bale.name_any()).await;
    ctx.metrics.reconciled("bale", &result);
    result.map(|()| Action::await_change())
}

async fn on_turtle(turtle: Arc<Turtle>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let namespace = turtle.namespace().unwrap_or_default();
    let result = ctx.reconcile_turtle(&namespace, &turtle.name_any()).await;
    ctx.metrics.reconciled("turtle", &result);
    result.map(|()| Action::requeue(TURTLE_RESYNC))
}

/// Watches Bales and Turtles and dispatches them to the reconciler.
pub struct Watcher {
    client: Client,
    namespace: Option<String>,
    reconciler: Arc<Context>,
}

impl Watcher {
    pub fn new(client: Client, namespace: Option<String>, reconciler: Arc<Context>) -> Self {
        Self {
            client,
            namespace,
            reconciler,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    pub async fn watch_bales(&self) -> Result<(), ControllerError> {
        info!("Starting Bale watcher");
        Controller::new(self.api::<Bale>(), watcher::Config::default())
            .owns(self.api::<Turtle>(), watcher::Config::default())
            .with_config(controller_config())
            .run(on_bale, error_policy::<Bale>, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled Bale {}", obj),
                    Err(e) => error!("Controller error for Bale: {}", e),
                }
            })
            .await;
        Err(ControllerError::Watch("Bale watch stream ended".to_string()))
    }

    pub async fn watch_turtles(&self) -> Result<(), ControllerError> {
        info!("Starting Turtle watcher");
        let owned = watcher::Config::default;
        Controller::new(self.api::<Turtle>(), watcher::Config::default())
            .owns(self.api::<Cluster>(), owned())
            .owns(self.api::<KubeadmConfigTemplate>(), owned())
            .owns(self.api::<KubeadmControlPlane>(), owned())
            .owns(self.api::<AzureMachineTemplate>(), owned())
            .owns(self.api::<MachineDeployment>(), owned())
            .owns(self.api::<AzureCluster>(), owned())
            .with_config(controller_config())
            .run(on_turtle, error_policy::<Turtle>, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled Turtle {}", obj),
                    Err(e) => error!("Controller error for Turtle: {}", e),
                }
            })
            .await;
        Err(ControllerError::Watch("Turtle watch stream ended".to_string()))
    }
}
