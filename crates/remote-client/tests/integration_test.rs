//! Integration tests for the kube-backed remote client
//!
//! These tests require a disposable cluster. Set REMOTE_KUBECONFIG to the
//! path of its kubeconfig to run them.

use remote_client::{KubeConnector, RemoteClusterConnector};

fn kubeconfig() -> Vec<u8> {
    let path = std::env::var("REMOTE_KUBECONFIG")
        .expect("REMOTE_KUBECONFIG environment variable must be set");
    std::fs::read(path).expect("readable kubeconfig")
}

#[tokio::test]
#[ignore] // Requires a disposable cluster
async fn test_ensure_namespace_is_idempotent() {
    let connector = KubeConnector::new("remote-client-test");
    let cluster = connector.connect(&kubeconfig()).await.expect("connect");

    cluster.ensure_namespace("remote-client-test").await.expect("first apply");
    cluster.ensure_namespace("remote-client-test").await.expect("second apply");
}

#[tokio::test]
async fn test_rejects_garbage_kubeconfig() {
    let connector = KubeConnector::new("remote-client-test");
    assert!(connector.connect(b"not: [a kubeconfig").await.is_err());
}
