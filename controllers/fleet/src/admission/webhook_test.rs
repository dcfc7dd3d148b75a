use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;
use crate::test_utils::{hatchling, turtle, turtle_spec};

fn state() -> WebhookState {
    WebhookState {
        metrics: Arc::new(Metrics::new().unwrap()),
    }
}

fn review(kind: &str, operation: &str, object: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": { "group": "infra.bale.dev", "version": "v1alpha1", "kind": kind },
            "resource": { "group": "infra.bale.dev", "version": "v1alpha1", "resource": format!("{}s", kind.to_lowercase()) },
            "requestKind": { "group": "infra.bale.dev", "version": "v1alpha1", "kind": kind },
            "requestResource": { "group": "infra.bale.dev", "version": "v1alpha1", "resource": format!("{}s", kind.to_lowercase()) },
            "name": "demo",
            "namespace": "default",
            "operation": operation,
            "userInfo": { "username": "admin", "uid": "1", "groups": ["system:masters"] },
            "object": object,
            "oldObject": null,
            "dryRun": false,
            "options": null
        }
    })
}

fn turtle_object(cp: &str, pool_version: Option<&str>) -> Value {
    serde_json::to_value(turtle("demo", turtle_spec(cp, vec![hatchling("pool0", pool_version)]))).unwrap()
}

async fn call(state: WebhookState, path: &str, body: Value) -> Value {
    let response = webhook_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let reply: Value = serde_json::from_slice(&bytes).unwrap();
    reply["response"].clone()
}

#[tokio::test]
async fn mutate_defaults_unset_pool_version() {
    let body = review("Turtle", "CREATE", turtle_object("1.18.0", None));
    let response = call(state(), MUTATE_TURTLE_PATH, body).await;

    assert_eq!(response["allowed"], true);
    assert_eq!(response["patchType"], "JSONPatch");
    let bytes: Vec<u8> = serde_json::from_value(response["patch"].clone()).unwrap();
    let ops: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        ops,
        json!([{ "op": "add", "path": "/spec/hatchlings/0/version", "value": "1.18.0" }])
    );
}

#[tokio::test]
async fn mutate_leaves_complete_turtle_alone() {
    let body = review("Turtle", "CREATE", turtle_object("1.18.0", Some("1.17.0")));
    let response = call(state(), MUTATE_TURTLE_PATH, body).await;

    assert_eq!(response["allowed"], true);
    assert!(response.get("patch").map_or(true, Value::is_null));
}

#[tokio::test]
async fn validate_rejects_newer_pool() {
    let state = state();
    let body = review("Turtle", "CREATE", turtle_object("1.18.0", Some("1.19.0")));
    let response = call(state.clone(), VALIDATE_TURTLE_PATH, body).await;

    assert_eq!(response["allowed"], false);
    let message = response["status"]["message"].as_str().unwrap();
    assert!(message.contains("1.18.0"));
    assert!(message.contains("1.19.0"));
    assert_eq!(response["status"]["code"], 400);
    assert_eq!(response["status"]["reason"], "BadRequest");

    let metrics = state.metrics.render().unwrap();
    assert!(metrics.contains(r#"fleet_admission_total{kind="Turtle",verdict="denied"} 1"#));
}

#[tokio::test]
async fn validate_rejects_on_update_too() {
    let body = review("Turtle", "UPDATE", turtle_object("1.18.0", Some("1.19.0")));
    let response = call(state(), VALIDATE_TURTLE_PATH, body).await;
    assert_eq!(response["allowed"], false);
}

#[tokio::test]
async fn validate_accepts_older_pool() {
    let body = review("Turtle", "CREATE", turtle_object("1.18.0", Some("1.17.0")));
    let response = call(state(), VALIDATE_TURTLE_PATH, body).await;
    assert_eq!(response["allowed"], true);
}

#[tokio::test]
async fn unparsable_version_is_reported_as_internal() {
    let body = review("Turtle", "CREATE", turtle_object("one.eighteen", Some("1.17.0")));
    let response = call(state(), VALIDATE_TURTLE_PATH, body).await;

    assert_eq!(response["allowed"], false);
    let message = response["status"]["message"].as_str().unwrap();
    assert!(message.starts_with("internal error"));
    assert_eq!(response["status"]["code"], 500);
    assert_eq!(response["status"]["reason"], "InternalError");
}

#[tokio::test]
async fn turtle_with_foreign_resource_group_is_denied() {
    let mut object = turtle_object("1.18.0", Some("1.17.0"));
    object["spec"]["resourceGroup"] = json!("shared-rg");
    let response = call(state(), VALIDATE_TURTLE_PATH, review("Turtle", "CREATE", object)).await;
    assert_eq!(response["allowed"], false);
    assert!(response["status"]["message"].as_str().unwrap().contains("shared-rg"));

    let mut object = turtle_object("1.18.0", Some("1.17.0"));
    object["spec"]["resourceGroup"] = json!("demo");
    let response = call(state(), VALIDATE_TURTLE_PATH, review("Turtle", "CREATE", object)).await;
    assert_eq!(response["allowed"], true);
}

#[tokio::test]
async fn delete_passes_through() {
    let body = review("Turtle", "DELETE", turtle_object("1.18.0", Some("1.19.0")));
    let response = call(state(), VALIDATE_TURTLE_PATH, body).await;
    assert_eq!(response["allowed"], true);
}

#[tokio::test]
async fn bale_without_match_labels_is_denied() {
    let mut bale = serde_json::to_value(crate::test_utils::bale("east", 2)).unwrap();
    bale["spec"]["selector"] = json!({});
    let response = call(state(), VALIDATE_BALE_PATH, review("Bale", "CREATE", bale)).await;

    assert_eq!(response["allowed"], false);
    assert!(response["status"]["message"].as_str().unwrap().contains("matchLabels"));
}

#[test]
fn defaulting_patch_adds_pool_version() {
    let turtle = turtle("demo", turtle_spec("1.18.0", vec![hatchling("pool0", None)]));
    let patch = defaulting_patch(&turtle).unwrap().unwrap();
    let ops = serde_json::to_value(&patch).unwrap();

    assert_eq!(
        ops,
        json!([{ "op": "add", "path": "/spec/hatchlings/0/version", "value": "1.18.0" }])
    );
}

#[test]
fn defaulting_patch_is_none_when_complete() {
    let turtle = turtle("demo", turtle_spec("1.18.0", vec![hatchling("pool0", Some("1.18.0"))]));
    assert!(defaulting_patch(&turtle).unwrap().is_none());
}
