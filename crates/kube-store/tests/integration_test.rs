//! Integration tests for KubeStore
//!
//! These tests require a reachable Kubernetes API server (the current
//! kubeconfig context) and write into the `default` namespace.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::core::Selector;
use kube_store::{KubeStore, ObjectStore, StoreError};

async fn store() -> KubeStore {
    let client = kube::Client::try_default()
        .await
        .expect("a kubeconfig pointing at a test cluster");
    KubeStore::new(client)
}

fn config_map(name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            labels: Some(BTreeMap::from([(
                "kube-store-test".to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
#[ignore] // Requires running Kubernetes API server
async fn test_create_get_replace_roundtrip() {
    let store = store().await;
    let name = format!("kube-store-{}", uuid_suffix());

    let created = store.create(&config_map(&name)).await.expect("create");
    let fetched: ConfigMap = store
        .get("default", &name)
        .await
        .expect("get")
        .expect("object exists");
    assert_eq!(created.metadata.uid, fetched.metadata.uid);

    store.replace(&fetched).await.expect("replace with fresh version");
    let stale = store.replace(&fetched).await.unwrap_err();
    assert!(matches!(stale, StoreError::Conflict(_)), "got {stale:?}");
}

#[tokio::test]
#[ignore]
async fn test_list_by_selector() {
    let store = store().await;
    let selector = Selector::try_from(LabelSelector {
        match_labels: Some(BTreeMap::from([(
            "kube-store-test".to_string(),
            "true".to_string(),
        )])),
        ..Default::default()
    })
    .expect("valid selector");

    let items: Vec<ConfigMap> = store.list("default", &selector).await.expect("list");
    println!("Found {} labelled config maps", items.len());
}

#[tokio::test]
#[ignore]
async fn test_get_missing_is_none() {
    let store = store().await;
    let missing: Option<ConfigMap> = store
        .get("default", "kube-store-does-not-exist")
        .await
        .expect("get");
    assert!(missing.is_none());
}

fn uuid_suffix() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_default()
}
