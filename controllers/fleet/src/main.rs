//! Bale Fleet Controller
//!
//! Keeps fleets of Azure workload clusters at their desired size:
//! - Bale: creates Turtles from a template until the fleet has enough members
//! - Turtle: composes Cluster API resources for one cluster and seeds the
//!   cluster with credentials and a CNI once it is reachable
//!
//! With `WEBHOOK_PORT` set, the process serves only the admission webhook.

mod admission;
mod config;
mod controller;
mod error;
mod leader;
mod metrics;
mod naming;
mod reconciler;
mod registry;
mod server;
mod sync;
mod templates;
mod watcher;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use kube::Client;
use kube_store::KubeStore;
use remote_client::KubeConnector;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::admission::WebhookState;
use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use crate::leader::LeaderElector;
use crate::metrics::Metrics;
use crate::naming::NamingService;
use crate::reconciler::Reconciler;
use crate::registry::Registry;
use crate::server::ServerState;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Both kube and axum-server pull in rustls; pick the provider explicitly
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        error!("A rustls crypto provider was already installed");
    }

    info!("Starting Bale Fleet Controller");

    let config = Config::from_env()?;
    let registry = Arc::new(Registry::from_config(&config));
    let metrics = Arc::new(
        Metrics::new().map_err(|e| ControllerError::Internal(format!("metrics registry: {e}")))?,
    );

    info!("Configuration:");
    info!("  API group: {}", registry.api_group);
    info!(
        "  Namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Leader election: {}", config.leader_election);
    info!(
        "  Credentials: {}/{}",
        registry.credentials_secret_namespace, registry.credentials_secret_name
    );

    if config.webhook_only() {
        info!("Webhook-only mode on port {}", config.webhook_port);
        return admission::serve(
            config.webhook_port,
            &config.webhook_cert_dir,
            WebhookState { metrics },
        )
        .await;
    }

    let client = Client::try_default().await?;
    let store = KubeStore::new(client.clone());
    let connector = Arc::new(KubeConnector::new(registry.field_manager.clone()));

    let server_state = ServerState::new(metrics.clone());
    let health = tokio::spawn(server::serve(
        config.health_addr,
        server::health_router(server_state.clone()),
        "health probes",
    ));
    let exposition = tokio::spawn(server::serve(
        config.metrics_addr,
        server::metrics_router(server_state.clone()),
        "metrics",
    ));

    let elector = if config.leader_election {
        let elector = LeaderElector::new(
            store.clone(),
            config.leader_election_namespace.clone(),
            config.identity.clone(),
        );
        elector.acquire().await;
        Some(elector)
    } else {
        None
    };

    let reconciler = Arc::new(Reconciler::new(
        store,
        connector,
        registry.clone(),
        NamingService::new(registry.fleet_member_prefix.clone()),
        metrics,
    ));

    let controller = Controller::start(client, config.watch_namespace.clone(), reconciler, elector);
    server_state.set_ready();

    tokio::select! {
        result = controller.run() => result,
        result = health => result.map_err(|e| ControllerError::Internal(format!("health server panicked: {e}")))?,
        result = exposition => result.map_err(|e| ControllerError::Internal(format!("metrics server panicked: {e}")))?,
    }
}
