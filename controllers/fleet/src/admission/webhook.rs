//! Admission webhook endpoints.
//!
//! Mutating endpoints default node pool versions and answer with a JSON
//! patch; validating endpoints run the invariant checks on create and
//! update. Requests whose object cannot be read as the expected kind are
//! denied with an internal error rather than admitted unchecked.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use crds::{Bale, Turtle};
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::validation;
use crate::error::ControllerError;
use crate::metrics::Metrics;

pub const MUTATE_BALE_PATH: &str = "/mutate-infra-bale-dev-v1alpha1-bale";
pub const VALIDATE_BALE_PATH: &str = "/validate-infra-bale-dev-v1alpha1-bale";
pub const MUTATE_TURTLE_PATH: &str = "/mutate-infra-bale-dev-v1alpha1-turtle";
pub const VALIDATE_TURTLE_PATH: &str = "/validate-infra-bale-dev-v1alpha1-turtle";

/// A kind the webhook defaults and validates
pub trait Admissible: Serialize + DeserializeOwned {
    const KIND: &'static str;

    /// Apply defaults; returns whether anything changed
    fn apply_defaults(&mut self) -> bool;

    fn validate(&self) -> Result<(), ControllerError>;
}

impl Admissible for Turtle {
    const KIND: &'static str = "Turtle";

    fn apply_defaults(&mut self) -> bool {
        validation::default_turtle(&mut self.spec)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        validation::validate_named_turtle(&self.name_any(), &self.spec)
    }
}

impl Admissible for Bale {
    const KIND: &'static str = "Bale";

    fn apply_defaults(&mut self) -> bool {
        validation::default_bale(&mut self.spec)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        validation::validate_bale(&self.spec)
    }
}

#[derive(Clone)]
pub struct WebhookState {
    pub metrics: Arc<Metrics>,
}

pub fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route(MUTATE_BALE_PATH, post(mutate_handler::<Bale>))
        .route(VALIDATE_BALE_PATH, post(validate_handler::<Bale>))
        .route(MUTATE_TURTLE_PATH, post(mutate_handler::<Turtle>))
        .route(VALIDATE_TURTLE_PATH, post(validate_handler::<Turtle>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the webhook over HTTPS with the certificate pair in `cert_dir`.
pub async fn serve(port: u16, cert_dir: &Path, state: WebhookState) -> Result<(), ControllerError> {
    let tls_config = RustlsConfig::from_pem_file(cert_dir.join("tls.crt"), cert_dir.join("tls.key"))
        .await
        .map_err(|e| {
            ControllerError::InvalidConfig(format!(
                "webhook certificate in {}: {e}",
                cert_dir.display()
            ))
        })?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Serving admission webhook on {}", addr);
    axum_server::bind_rustls(addr, tls_config)
        .serve(webhook_router(state).into_make_service())
        .await
        .map_err(|e| ControllerError::Internal(format!("webhook server: {e}")))
}

/// Decode the admitted object as `K`
fn typed<K: Admissible>(obj: &DynamicObject) -> Result<K, ControllerError> {
    let value = serde_json::to_value(obj)
        .map_err(|e| ControllerError::Internal(format!("re-encoding {}: {e}", K::KIND)))?;
    serde_json::from_value(value)
        .map_err(|e| ControllerError::Internal(format!("{} is malformed: {e}", K::KIND)))
}

/// JSON patch taking the object to its defaulted form, if defaults changed it
pub fn defaulting_patch<K: Admissible>(obj: &K) -> Result<Option<json_patch::Patch>, ControllerError> {
    let before = serde_json::to_value(obj)
        .map_err(|e| ControllerError::Internal(format!("encoding {}: {e}", K::KIND)))?;
    let mut defaulted: K = serde_json::from_value(before.clone())
        .map_err(|e| ControllerError::Internal(format!("decoding {}: {e}", K::KIND)))?;
    if !defaulted.apply_defaults() {
        return Ok(None);
    }
    let after = serde_json::to_value(&defaulted)
        .map_err(|e| ControllerError::Internal(format!("encoding {}: {e}", K::KIND)))?;
    Ok(Some(json_patch::diff(&before, &after)))
}

/// Bad input is answered 400 BadRequest; anything else 500 InternalError.
fn deny(request: &AdmissionRequest<DynamicObject>, err: &ControllerError) -> AdmissionResponse {
    let (message, code, reason) = match err {
        ControllerError::Validation(msg) => (msg.clone(), 400, "BadRequest"),
        other => (format!("internal error: {other}"), 500, "InternalError"),
    };
    let mut response = AdmissionResponse::from(request).deny(message);
    response.result.code = code;
    response.result.reason = reason.to_string();
    response
}

fn parse(review: AdmissionReview<DynamicObject>) -> Result<AdmissionRequest<DynamicObject>, AdmissionResponse> {
    let request: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    request.map_err(|e| {
        error!("Failed to parse admission request: {}", e);
        AdmissionResponse::invalid(e.to_string())
    })
}

async fn mutate_handler<K: Admissible>(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return Json(response.into_review()),
    };
    let (response, verdict) = mutate::<K>(&request);
    state
        .metrics
        .admission_total
        .with_label_values(&[K::KIND, verdict])
        .inc();
    Json(response.into_review())
}

fn mutate<K: Admissible>(request: &AdmissionRequest<DynamicObject>) -> (AdmissionResponse, &'static str) {
    let Some(obj) = &request.object else {
        return (AdmissionResponse::from(request), "allowed");
    };
    let patch = typed::<K>(obj).and_then(|typed| defaulting_patch(&typed));
    match patch {
        Ok(None) => {
            debug!("{} {} needs no defaults", K::KIND, request.name);
            (AdmissionResponse::from(request), "allowed")
        }
        Ok(Some(patch)) => match AdmissionResponse::from(request).with_patch(patch) {
            Ok(response) => {
                info!("Defaulted {} {}", K::KIND, request.name);
                (response, "patched")
            }
            Err(e) => {
                let err = ControllerError::Internal(format!("patch serialization: {e}"));
                error!("{}", err);
                (deny(request, &err), "error")
            }
        },
        Err(err) => {
            error!("Defaulting {} {} failed: {}", K::KIND, request.name, err);
            (deny(request, &err), "error")
        }
    }
}

async fn validate_handler<K: Admissible>(
    State(state): State<WebhookState>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request = match parse(review) {
        Ok(request) => request,
        Err(response) => return Json(response.into_review()),
    };
    let (response, verdict) = validate::<K>(&request);
    state
        .metrics
        .admission_total
        .with_label_values(&[K::KIND, verdict])
        .inc();
    Json(response.into_review())
}

fn validate<K: Admissible>(request: &AdmissionRequest<DynamicObject>) -> (AdmissionResponse, &'static str) {
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        return (AdmissionResponse::from(request), "allowed");
    }
    let Some(obj) = &request.object else {
        return (AdmissionResponse::from(request), "allowed");
    };
    match typed::<K>(obj).and_then(|typed| typed.validate()) {
        Ok(()) => (AdmissionResponse::from(request), "allowed"),
        Err(err @ ControllerError::Validation(_)) => {
            warn!("Rejected {} {}: {}", K::KIND, request.name, err);
            (deny(request, &err), "denied")
        }
        Err(err) => {
            error!("Validating {} {} failed: {}", K::KIND, request.name, err);
            (deny(request, &err), "error")
        }
    }
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
