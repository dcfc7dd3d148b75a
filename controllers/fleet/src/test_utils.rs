//! Test utilities for unit testing reconcilers
//!
//! Builders for Bales, Turtles and the secrets the remote bootstrap stage
//! reads, plus a reconciler wired to the in-memory mocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use crds::{Bale, BaleSpec, FleetSelector, HatchlingSpec, Turtle, TurtleSpec};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube_store::MockObjectStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use remote_client::MockRemoteConnector;

use crate::config::CloudSettings;
use crate::metrics::Metrics;
use crate::naming::{self, NamingService};
use crate::reconciler::Reconciler;
use crate::registry::{Registry, FIELD_MANAGER, FLEET_MEMBER_PREFIX, KUBECONFIG_KEY};

pub const NAMESPACE: &str = "default";
pub const ADDON_URL: &str = "https://addons.test/calico.yaml";

pub fn hatchling(name: &str, version: Option<&str>) -> HatchlingSpec {
    HatchlingSpec {
        name: name.to_string(),
        os_disk_size_gb: 512,
        replicas: 3,
        version: version.map(str::to_string),
        vm_size: "Standard_D8s_v3".to_string(),
    }
}

pub fn turtle_spec(version: &str, pools: Vec<HatchlingSpec>) -> TurtleSpec {
    TurtleSpec {
        location: "eastus".to_string(),
        resource_group: String::new(),
        control_plane_replicas: 1,
        control_plane_vm_size: "Standard_D2s_v3".to_string(),
        version: version.to_string(),
        hatchlings: pools,
    }
}

/// Unsaved Turtle; seed it with `MockObjectStore::insert` to get a uid
pub fn turtle(name: &str, spec: TurtleSpec) -> Turtle {
    let mut turtle = Turtle::new(name, spec);
    turtle.metadata.namespace = Some(NAMESPACE.to_string());
    turtle
}

pub fn fleet_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("fleet".to_string(), "east".to_string())])
}

pub fn bale(name: &str, replicas: i32) -> Bale {
    let mut bale = Bale::new(
        name,
        BaleSpec {
            replicas,
            selector: FleetSelector {
                match_labels: fleet_labels(),
                match_expressions: Vec::new(),
            },
            subscription_id: None,
            template: turtle_spec("1.18.0", vec![hatchling("pool0", Some("1.18.0"))]),
        },
    );
    bale.metadata.namespace = Some(NAMESPACE.to_string());
    bale
}

fn secret(name: &str, namespace: &str, data: &[(&str, &[u8])]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

pub fn kubeconfig_secret(cluster: &str) -> Secret {
    secret(
        &naming::kubeconfig_secret_name(cluster),
        NAMESPACE,
        &[(KUBECONFIG_KEY, &b"apiVersion: v1\nkind: Config\n"[..])],
    )
}

pub fn credentials_secret(registry: &Registry) -> Secret {
    let mut secret = secret(
        &registry.credentials_secret_name,
        &registry.credentials_secret_namespace,
        &[("AZURE_CLIENT_SECRET", &b"hunter2"[..])],
    );
    secret.metadata.labels = Some(BTreeMap::from([("app".to_string(), "bale".to_string())]));
    secret
}

pub fn registry() -> Registry {
    Registry {
        api_group: crds::API_GROUP,
        field_manager: FIELD_MANAGER.to_string(),
        fleet_member_prefix: FLEET_MEMBER_PREFIX.to_string(),
        credentials_secret_name: "bale-manager-credentials".to_string(),
        credentials_secret_namespace: "bale-system".to_string(),
        remote_namespace: "bale-system".to_string(),
        addon_manifest_url: ADDON_URL.to_string(),
        cloud: CloudSettings {
            environment: "AzurePublicCloud".to_string(),
            tenant_id: "tenant".to_string(),
            subscription_id: "subscription".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        },
    }
}

pub struct Harness {
    pub store: MockObjectStore,
    pub remote: MockRemoteConnector,
    pub reconciler: Reconciler<MockObjectStore>,
}

/// Naming service with a fixed seed, so tests can predict member names
pub fn seeded_naming() -> NamingService {
    NamingService::with_rng(FLEET_MEMBER_PREFIX, Box::new(StdRng::seed_from_u64(42)))
}

pub fn harness() -> Harness {
    harness_with(seeded_naming())
}

pub fn harness_with(naming: NamingService) -> Harness {
    let store = MockObjectStore::new();
    let remote = MockRemoteConnector::new();
    let reconciler = Reconciler::new(
        store.clone(),
        Arc::new(remote.clone()),
        Arc::new(registry()),
        naming,
        Arc::new(Metrics::new().unwrap()),
    );
    Harness {
        store,
        remote,
        reconciler,
    }
}
