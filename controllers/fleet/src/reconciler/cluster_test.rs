use crds::capi::{
    AzureCluster, AzureMachineTemplate, Cluster, KubeadmConfigTemplate, KubeadmControlPlane,
    MachineDeployment,
};
use k8s_openapi::api::core::v1::Secret;
use kube_store::MockObjectStore;

use super::*;
use crate::test_utils::{
    credentials_secret, harness, hatchling, kubeconfig_secret, registry, turtle, turtle_spec, Harness,
    NAMESPACE,
};

fn two_pool_turtle() -> Turtle {
    turtle(
        "demo",
        turtle_spec(
            "1.18.0",
            vec![hatchling("pool0", Some("1.18.0")), hatchling("gpu", Some("1.17.0"))],
        ),
    )
}

/// Harness with a stored Turtle and both secrets the remote stage reads
fn ready_harness() -> Harness {
    let h = harness();
    h.store.insert(&two_pool_turtle());
    h.store.insert(&credentials_secret(&registry()));
    h.store.insert(&kubeconfig_secret("demo"));
    h
}

fn child_counts(store: &MockObjectStore) -> [usize; 6] {
    [
        store.all::<Cluster>(NAMESPACE).len(),
        store.all::<KubeadmConfigTemplate>(NAMESPACE).len(),
        store.all::<KubeadmControlPlane>(NAMESPACE).len(),
        store.all::<AzureMachineTemplate>(NAMESPACE).len(),
        store.all::<MachineDeployment>(NAMESPACE).len(),
        store.all::<AzureCluster>(NAMESPACE).len(),
    ]
}

fn stage_states(store: &MockObjectStore) -> Vec<(String, StageState)> {
    let turtle: Turtle = store.object(NAMESPACE, "demo").unwrap();
    turtle
        .status
        .unwrap()
        .stages
        .into_iter()
        .map(|s| (s.name, s.state))
        .collect()
}

#[tokio::test]
async fn composes_every_child_and_bootstraps() {
    let h = ready_harness();

    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();

    assert_eq!(child_counts(&h.store), [1, 1, 1, 3, 2, 1]);
    assert_eq!(h.remote.secret_count(), 1);
    assert_eq!(h.remote.applied_urls().len(), 1);

    let turtle: Turtle = h.store.object(NAMESPACE, "demo").unwrap();
    let status = turtle.status.unwrap();
    assert_eq!(status.phase, TurtlePhase::Provisioned);
    let names: Vec<&str> = status.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "clusterShell",
            "bootstrapConfig",
            "controlPlane",
            "machineTemplates",
            "machineDeployments",
            "azureCluster",
            "remoteBootstrap",
        ]
    );
    assert!(status.stages.iter().all(|s| s.state == StageState::Succeeded && s.message.is_none()));
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let h = ready_harness();
    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();
    h.store.reset_counters();

    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();

    assert_eq!(h.store.write_count(), 0);
    assert!(h.store.status_writes().is_empty());
    assert_eq!(child_counts(&h.store), [1, 1, 1, 3, 2, 1]);
}

#[tokio::test]
async fn missing_kubeconfig_fails_only_the_last_stage() {
    let h = harness();
    h.store.insert(&two_pool_turtle());
    h.store.insert(&credentials_secret(&registry()));

    let err = h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap_err();

    assert!(matches!(err.root(), ControllerError::NotYetAvailable(_)));
    assert!(err.to_string().contains("remoteBootstrap"));
    assert_eq!(child_counts(&h.store), [1, 1, 1, 3, 2, 1]);

    let turtle: Turtle = h.store.object(NAMESPACE, "demo").unwrap();
    let status = turtle.status.unwrap();
    assert_eq!(status.phase, TurtlePhase::Pending);
    let last = status.stages.last().unwrap();
    assert_eq!(last.state, StageState::Failed);
    assert!(last.message.as_ref().unwrap().contains("demo-kubeconfig"));

    // Kubeconfig shows up; the next pass finishes without touching the children
    h.store.insert(&kubeconfig_secret("demo"));
    h.store.reset_counters();
    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.store.status_writes().len(), 1);
}

#[tokio::test]
async fn control_plane_failure_converges_on_retry() {
    let h = ready_harness();
    h.store.fail_writes_for::<KubeadmControlPlane>("admission webhook unavailable");

    let err = h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap_err();
    assert!(err.to_string().contains("controlPlane"));
    assert_eq!(
        stage_states(&h.store),
        vec![
            ("clusterShell".to_string(), StageState::Succeeded),
            ("bootstrapConfig".to_string(), StageState::Succeeded),
            ("controlPlane".to_string(), StageState::Failed),
            ("machineTemplates".to_string(), StageState::Skipped),
            ("machineDeployments".to_string(), StageState::Skipped),
            ("azureCluster".to_string(), StageState::Skipped),
            ("remoteBootstrap".to_string(), StageState::Skipped),
        ]
    );
    assert_eq!(h.store.all::<MachineDeployment>(NAMESPACE).len(), 0);
    assert_eq!(h.remote.secret_count(), 0);

    h.store.clear_failures();
    h.store.reset_counters();
    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();

    let writes = h.store.writes();
    assert!(writes.iter().all(|w| w.verb == "create"));
    assert!(!writes.iter().any(|w| w.kind == "Cluster" || w.kind == "KubeadmConfigTemplate"));
    assert!(!writes.iter().any(|w| w.name == "demo-control-plane"));
    assert!(writes.iter().any(|w| w.kind == "KubeadmControlPlane"));
    assert_eq!(child_counts(&h.store), [1, 1, 1, 3, 2, 1]);

    let failures = h.reconciler.metrics.render().unwrap();
    assert!(failures.contains(r#"fleet_stage_failures_total{stage="controlPlane"} 1"#));
}

#[tokio::test]
async fn spec_change_updates_only_the_affected_child() {
    let h = ready_harness();
    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();

    let mut stored: Turtle = h.store.object(NAMESPACE, "demo").unwrap();
    stored.spec.hatchlings[1].replicas = 5;
    h.store.insert(&stored);
    h.store.reset_counters();

    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();

    let writes = h.store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].verb, "replace");
    assert_eq!(writes[0].kind, "MachineDeployment");
    assert_eq!(writes[0].name, "demo-gpu");

    let deployment: MachineDeployment = h.store.object(NAMESPACE, "demo-gpu").unwrap();
    assert_eq!(deployment.spec.replicas, 5);
    assert_eq!(deployment.owner_references().len(), 1);
}

#[tokio::test]
async fn deleting_the_turtle_cascades_to_children() {
    let h = ready_harness();
    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();

    let removed = h.store.delete_cascade::<Turtle>(NAMESPACE, "demo");

    // Turtle plus nine children
    assert_eq!(removed, 10);
    assert_eq!(child_counts(&h.store), [0; 6]);
    // The secrets are not owned by the Turtle
    assert_eq!(h.store.all::<Secret>(NAMESPACE).len(), 1);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn status_write_failure_fails_an_otherwise_clean_pass() {
    let h = ready_harness();
    h.store.fail_writes_for::<Turtle>("status down");

    let err = h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap_err();

    assert!(matches!(err.root(), ControllerError::Store(_)));
    assert!(err.to_string().contains("status down"));
    assert!(err.is_retryable());
    assert_eq!(child_counts(&h.store), [1, 1, 1, 3, 2, 1]);
    let turtle: Turtle = h.store.object(NAMESPACE, "demo").unwrap();
    assert!(turtle.status.is_none());

    // Status lands on the next pass, with nothing else rewritten
    h.store.clear_failures();
    h.store.reset_counters();
    h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap();
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.store.status_writes().len(), 1);
}

#[tokio::test]
async fn stage_error_wins_over_status_write_failure() {
    let h = harness();
    h.store.insert(&two_pool_turtle());
    h.store.insert(&credentials_secret(&registry()));
    h.store.fail_writes_for::<Turtle>("status down");

    let err = h.reconciler.reconcile_turtle(NAMESPACE, "demo").await.unwrap_err();

    assert!(matches!(err.root(), ControllerError::NotYetAvailable(_)));
    assert!(err.to_string().contains("remoteBootstrap"));
    let turtle: Turtle = h.store.object(NAMESPACE, "demo").unwrap();
    assert!(turtle.status.is_none());
}

#[test]
fn retryable_failure_leaves_turtle_pending() {
    let report = PipelineReport {
        stages: vec![
            (Stage::ClusterShell, StageOutcome::Succeeded { writes: 0 }),
            (Stage::RemoteBootstrap, StageOutcome::Failed("no kubeconfig".into())),
        ],
        error: Some(
            ControllerError::NotYetAvailable("no kubeconfig".into()).in_stage("remoteBootstrap"),
        ),
    };
    assert_eq!(report.status().phase, TurtlePhase::Pending);

    let report = PipelineReport {
        stages: vec![(Stage::ClusterShell, StageOutcome::Succeeded { writes: 0 })],
        error: None,
    };
    assert_eq!(report.status().phase, TurtlePhase::Provisioned);
}

#[tokio::test]
async fn missing_turtle_is_ignored() {
    let h = harness();
    h.reconciler.reconcile_turtle(NAMESPACE, "ghost").await.unwrap();
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn compose_failure_fails_first_stage_and_skips_the_rest() {
    let h = harness();
    // Never stored, so it has no uid to own children with
    let unsaved = two_pool_turtle();

    let report = h.reconciler.run_pipeline(&unsaved).await;

    assert!(matches!(report.error.as_ref().map(ControllerError::root), Some(ControllerError::Internal(_))));
    assert_eq!(report.stages.len(), Stage::ALL.len());
    assert!(matches!(report.stages[0], (Stage::ClusterShell, StageOutcome::Failed(_))));
    assert!(report.stages[1..].iter().all(|(_, o)| *o == StageOutcome::Skipped));
    assert_eq!(report.writes(), 0);
    assert!(h.store.is_empty());
}

#[test]
fn skipped_stages_name_the_failure() {
    let report = PipelineReport {
        stages: vec![
            (Stage::ClusterShell, StageOutcome::Succeeded { writes: 1 }),
            (Stage::BootstrapConfig, StageOutcome::Failed("boom".into())),
            (Stage::ControlPlane, StageOutcome::Skipped),
        ],
        error: Some(ControllerError::Internal("boom".into())),
    };
    let status = report.status();

    assert_eq!(status.phase, TurtlePhase::Failed);
    assert_eq!(status.stages[1].message.as_deref(), Some("boom"));
    assert_eq!(status.stages[2].message.as_deref(), Some("bootstrapConfig failed"));
    assert_eq!(report.writes(), 1);
}
