//! Main controller implementation.
//!
//! Spawns the Bale and Turtle watchers (and, when leader election is on, the
//! lease renewal loop) and runs until any of them exits.

use std::sync::Arc;

use kube::Client;
use kube_store::KubeStore;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::ControllerError;
use crate::leader::LeaderElector;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;

/// Running controller tasks
pub struct Controller {
    bale_watcher: JoinHandle<Result<(), ControllerError>>,
    turtle_watcher: JoinHandle<Result<(), ControllerError>>,
    leadership: Option<JoinHandle<Result<(), ControllerError>>>,
}

impl Controller {
    /// Start the watchers. `elector` must already hold the lease.
    pub fn start(
        client: Client,
        namespace: Option<String>,
        reconciler: Arc<Reconciler<KubeStore>>,
        elector: Option<LeaderElector<KubeStore>>,
    ) -> Self {
        info!(
            "Watching {}",
            namespace.as_deref().unwrap_or("all namespaces")
        );
        let watcher = Arc::new(Watcher::new(client, namespace, reconciler));

        let bale_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_bales().await })
        };
        let turtle_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_turtles().await })
        };
        let leadership = elector.map(|elector| tokio::spawn(async move { elector.hold().await }));

        Self {
            bale_watcher,
            turtle_watcher,
            leadership,
        }
    }

    /// Run until a watcher or the lease renewal loop exits.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Fleet controller running");

        let Controller {
            bale_watcher,
            turtle_watcher,
            leadership,
        } = self;
        let leadership = async move {
            match leadership {
                Some(handle) => handle.await,
                None => futures::future::pending().await,
            }
        };

        tokio::select! {
            result = bale_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Bale watcher panicked: {}", e)))??;
            }
            result = turtle_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Turtle watcher panicked: {}", e)))??;
            }
            result = leadership => {
                result.map_err(|e| ControllerError::LeaderElection(format!("lease renewal panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
