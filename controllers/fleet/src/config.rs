//! Process configuration, read once from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ControllerError;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:9440";
const DEFAULT_SYSTEM_NAMESPACE: &str = "bale-system";
const DEFAULT_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";
const DEFAULT_CREDENTIALS_SECRET: &str = "bale-manager-credentials";
pub const DEFAULT_ADDON_MANIFEST_URL: &str = "https://raw.githubusercontent.com/kubernetes-sigs/cluster-api-provider-azure/master/templates/addons/calico.yaml";

/// Cloud identity embedded in every generated cloud-provider config.
/// Unset variables become empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudSettings {
    pub environment: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Restrict watches to one namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
    pub metrics_addr: SocketAddr,
    pub health_addr: SocketAddr,
    pub leader_election: bool,
    pub leader_election_namespace: String,
    pub identity: String,
    /// Non-zero selects webhook-only mode
    pub webhook_port: u16,
    pub webhook_cert_dir: PathBuf,
    pub credentials_secret_name: String,
    pub credentials_secret_namespace: String,
    pub addon_manifest_url: String,
    pub cloud: CloudSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let addr = |key: &str, default: &str| -> Result<SocketAddr, ControllerError> {
            or(key, default).parse().map_err(|e| {
                ControllerError::InvalidConfig(format!("{key} is not a socket address: {e}"))
            })
        };

        let leader_election = match get("ENABLE_LEADER_ELECTION").as_deref() {
            None => false,
            Some(v) => v.parse::<bool>().map_err(|_| {
                ControllerError::InvalidConfig(format!(
                    "ENABLE_LEADER_ELECTION must be true or false, got {v:?}"
                ))
            })?,
        };

        let webhook_port = match get("WEBHOOK_PORT") {
            None => 0,
            Some(v) => v.parse::<u16>().map_err(|e| {
                ControllerError::InvalidConfig(format!("WEBHOOK_PORT {v:?} is invalid: {e}"))
            })?,
        };

        let identity = get("POD_NAME")
            .unwrap_or_else(|| format!("bale-controller-{}", uuid::Uuid::new_v4()));

        Ok(Config {
            watch_namespace: get("WATCH_NAMESPACE"),
            metrics_addr: addr("METRICS_ADDR", DEFAULT_METRICS_ADDR)?,
            health_addr: addr("HEALTH_ADDR", DEFAULT_HEALTH_ADDR)?,
            leader_election,
            leader_election_namespace: or("LEADER_ELECTION_NAMESPACE", DEFAULT_SYSTEM_NAMESPACE),
            identity,
            webhook_port,
            webhook_cert_dir: PathBuf::from(or("WEBHOOK_CERT_DIR", DEFAULT_CERT_DIR)),
            credentials_secret_name: or("CREDENTIALS_SECRET_NAME", DEFAULT_CREDENTIALS_SECRET),
            credentials_secret_namespace: or(
                "CREDENTIALS_SECRET_NAMESPACE",
                DEFAULT_SYSTEM_NAMESPACE,
            ),
            addon_manifest_url: or("ADDON_MANIFEST_URL", DEFAULT_ADDON_MANIFEST_URL),
            cloud: CloudSettings {
                environment: or("AZURE_ENVIRONMENT", ""),
                tenant_id: or("AZURE_TENANT_ID", ""),
                subscription_id: or("AZURE_SUBSCRIPTION_ID", ""),
                client_id: or("AZURE_CLIENT_ID", ""),
                client_secret: or("AZURE_CLIENT_SECRET", ""),
            },
        })
    }

    pub fn webhook_only(&self) -> bool {
        self.webhook_port != 0
    }
}
