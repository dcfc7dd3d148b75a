//! Process-wide constants and well-known locations, built once in `main` and
//! shared by `Arc` with every component that needs them.

use crate::config::{CloudSettings, Config};

pub const FIELD_MANAGER: &str = "bale-controller";
pub const FLEET_MEMBER_PREFIX: &str = "acecap-";

/// Secret key holding the kubeconfig of a composed cluster
pub const KUBECONFIG_KEY: &str = "value";

#[derive(Debug, Clone)]
pub struct Registry {
    pub api_group: &'static str,
    pub field_manager: String,
    pub fleet_member_prefix: String,
    /// Secret carrying this controller's own cloud credentials
    pub credentials_secret_name: String,
    pub credentials_secret_namespace: String,
    /// Namespace the credentials are copied into on every workload cluster
    pub remote_namespace: String,
    pub addon_manifest_url: String,
    pub cloud: CloudSettings,
}

impl Registry {
    pub fn from_config(config: &Config) -> Self {
        Registry {
            api_group: crds::API_GROUP,
            field_manager: FIELD_MANAGER.to_string(),
            fleet_member_prefix: FLEET_MEMBER_PREFIX.to_string(),
            credentials_secret_name: config.credentials_secret_name.clone(),
            credentials_secret_namespace: config.credentials_secret_namespace.clone(),
            remote_namespace: config.credentials_secret_namespace.clone(),
            addon_manifest_url: config.addon_manifest_url.clone(),
            cloud: config.cloud.clone(),
        }
    }
}
