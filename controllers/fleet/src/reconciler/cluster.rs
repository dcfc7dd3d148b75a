//! Cluster composition.
//!
//! A Turtle is driven through a fixed, ordered list of stages on every
//! reconcile. Each stage upserts its share of the composed children and is
//! idempotent on its own; the first failure skips everything after it. The
//! per-stage result is recorded in the Turtle's status so partial progress
//! is visible.

use crds::{StageState, StageStatus, Turtle, TurtlePhase, TurtleStatus};
use kube::ResourceExt;
use kube_store::{ObjectStore, StoreResource};
use tracing::{debug, info, warn};

use super::Reconciler;
use crate::error::ControllerError;
use crate::sync;
use crate::templates::ChildResourceSet;

/// Composition stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ClusterShell,
    BootstrapConfig,
    /// Control-plane machine template and KubeadmControlPlane
    ControlPlane,
    MachineTemplates,
    MachineDeployments,
    AzureCluster,
    RemoteBootstrap,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::ClusterShell,
        Stage::BootstrapConfig,
        Stage::ControlPlane,
        Stage::MachineTemplates,
        Stage::MachineDeployments,
        Stage::AzureCluster,
        Stage::RemoteBootstrap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::ClusterShell => "clusterShell",
            Stage::BootstrapConfig => "bootstrapConfig",
            Stage::ControlPlane => "controlPlane",
            Stage::MachineTemplates => "machineTemplates",
            Stage::MachineDeployments => "machineDeployments",
            Stage::AzureCluster => "azureCluster",
            Stage::RemoteBootstrap => "remoteBootstrap",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Ran to completion; `writes` counts children created or updated
    Succeeded { writes: usize },
    Skipped,
    Failed(String),
}

/// Result of one pass over the pipeline
#[derive(Debug)]
pub struct PipelineReport {
    pub stages: Vec<(Stage, StageOutcome)>,
    pub error: Option<ControllerError>,
}

impl PipelineReport {
    /// Total child writes across the stages that ran
    pub fn writes(&self) -> usize {
        self.stages
            .iter()
            .map(|(_, outcome)| match outcome {
                StageOutcome::Succeeded { writes } => *writes,
                _ => 0,
            })
            .sum()
    }

    /// The status this pass should leave behind. Write counts are left out,
    /// so a converged pass reproduces the previous status exactly.
    pub fn status(&self) -> TurtleStatus {
        let mut failed_stage = None;
        let stages = self
            .stages
            .iter()
            .map(|(stage, outcome)| {
                let (state, message) = match outcome {
                    StageOutcome::Succeeded { .. } => (StageState::Succeeded, None),
                    StageOutcome::Failed(reason) => {
                        failed_stage = Some(stage.name());
                        (StageState::Failed, Some(reason.clone()))
                    }
                    StageOutcome::Skipped => (
                        StageState::Skipped,
                        failed_stage.map(|failed| format!("{failed} failed")),
                    ),
                };
                StageStatus {
                    name: stage.name().to_string(),
                    state,
                    message,
                }
            })
            .collect();

        // A retryable failure (e.g. kubeconfig not published yet) is still converging
        let phase = match &self.error {
            None => TurtlePhase::Provisioned,
            Some(err) if err.is_retryable() => TurtlePhase::Pending,
            Some(_) => TurtlePhase::Failed,
        };
        TurtleStatus { phase, stages }
    }
}

impl<S: ObjectStore> Reconciler<S> {
    /// Compose a Turtle into its Cluster API children and bootstrap the
    /// resulting workload cluster.
    pub async fn reconcile_turtle(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        info!("Reconciling Turtle {}/{}", namespace, name);

        let Some(turtle) = self.store.get::<Turtle>(namespace, name).await? else {
            debug!("Turtle {}/{} no longer exists", namespace, name);
            return Ok(());
        };

        let report = self.run_pipeline(&turtle).await;
        debug!(
            "Turtle {}/{}: pipeline made {} child writes",
            namespace,
            name,
            report.writes()
        );

        let status = self.update_turtle_status(&turtle, report.status()).await;
        match report.error {
            Some(err) => {
                if let Err(status_err) = status {
                    warn!("Turtle {}/{}: status not recorded: {}", namespace, name, status_err);
                }
                Err(err)
            }
            None => status,
        }
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn run_pipeline(&self, turtle: &Turtle) -> PipelineReport {
        let mut report = PipelineReport {
            stages: Vec::with_capacity(Stage::ALL.len()),
            error: None,
        };

        let children = match ChildResourceSet::compose(turtle, &self.registry.cloud) {
            Ok(children) => children,
            Err(e) => {
                self.record_failure(&mut report, Stage::ALL[0], e);
                report
                    .stages
                    .extend(Stage::ALL[1..].iter().map(|stage| (*stage, StageOutcome::Skipped)));
                return report;
            }
        };

        for stage in Stage::ALL {
            if report.error.is_some() {
                report.stages.push((stage, StageOutcome::Skipped));
                continue;
            }
            match self.run_stage(stage, turtle, &children).await {
                Ok(writes) => report.stages.push((stage, StageOutcome::Succeeded { writes })),
                Err(e) => self.record_failure(&mut report, stage, e),
            }
        }
        report
    }

    fn record_failure(&self, report: &mut PipelineReport, stage: Stage, err: ControllerError) {
        warn!("Stage {} failed: {}", stage.name(), err);
        self.metrics
            .stage_failures_total
            .with_label_values(&[stage.name()])
            .inc();
        report.stages.push((stage, StageOutcome::Failed(err.to_string())));
        report.error = Some(err.in_stage(stage.name()));
    }

    async fn run_stage(
        &self,
        stage: Stage,
        turtle: &Turtle,
        children: &ChildResourceSet,
    ) -> Result<usize, ControllerError> {
        match stage {
            Stage::ClusterShell => self.sync_merged(&children.cluster).await,
            Stage::BootstrapConfig => self.sync_merged(&children.bootstrap).await,
            Stage::ControlPlane => {
                let template = self.sync_merged(&children.control_plane_template).await?;
                Ok(template + self.sync_merged(&children.control_plane).await?)
            }
            Stage::MachineTemplates => self.sync_each(&children.pool_templates).await,
            Stage::MachineDeployments => self.sync_each(&children.pool_deployments).await,
            Stage::AzureCluster => self.sync_merged(&children.azure_cluster).await,
            Stage::RemoteBootstrap => {
                let namespace = turtle.namespace().unwrap_or_default();
                self.propagate_bootstrap(&namespace, &turtle.name_any()).await?;
                Ok(0)
            }
        }
    }

    /// Upsert one child; 1 if it was written, 0 if already current
    async fn sync_merged<K: StoreResource>(&self, desired: &K) -> Result<usize, ControllerError> {
        let (_, outcome) = self.sync_child(desired, sync::merge_desired).await?;
        Ok(usize::from(outcome.wrote()))
    }

    async fn sync_each<K: StoreResource>(&self, desired: &[K]) -> Result<usize, ControllerError> {
        let mut writes = 0;
        for child in desired {
            writes += self.sync_merged(child).await?;
        }
        Ok(writes)
    }

    async fn update_turtle_status(&self, turtle: &Turtle, status: TurtleStatus) -> Result<(), ControllerError> {
        if turtle.status.as_ref() == Some(&status) {
            return Ok(());
        }
        let namespace = turtle.namespace().unwrap_or_default();
        let value = serde_json::to_value(&status)
            .map_err(|e| ControllerError::Internal(format!("Turtle status does not serialize: {e}")))?;
        self.store
            .patch_status::<Turtle>(&namespace, &turtle.name_any(), value)
            .await?;
        info!(
            "Turtle {}/{} phase {:?}",
            namespace,
            turtle.name_any(),
            status.phase
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "cluster_test.rs"]
mod tests;
