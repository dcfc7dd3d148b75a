//! Azure cloud-provider configuration embedded into every node's bootstrap.

use serde::{Deserialize, Serialize};

use crate::config::CloudSettings;
use crate::error::ControllerError;

pub const CLOUD_CONFIG_PATH: &str = "/etc/kubernetes/azure.json";
pub const MAX_LOAD_BALANCER_RULES: i32 = 250;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudProviderConfig {
    pub cloud: String,
    pub tenant_id: String,
    pub subscription_id: String,
    pub aad_client_id: String,
    pub aad_client_secret: String,
    pub resource_group: String,
    pub security_group_name: String,
    pub location: String,
    pub vm_type: String,
    pub vnet_name: String,
    pub vnet_resource_group: String,
    pub subnet_name: String,
    pub route_table_name: String,
    pub load_balancer_sku: String,
    pub maximum_load_balancer_rule_count: i32,
    pub use_managed_identity_extension: bool,
    pub use_instance_metadata: bool,
}

impl CloudProviderConfig {
    pub fn new(cluster: &str, resource_group: &str, location: &str, cloud: &CloudSettings) -> Self {
        CloudProviderConfig {
            cloud: cloud.environment.clone(),
            tenant_id: cloud.tenant_id.clone(),
            subscription_id: cloud.subscription_id.clone(),
            aad_client_id: cloud.client_id.clone(),
            aad_client_secret: cloud.client_secret.clone(),
            resource_group: resource_group.to_string(),
            security_group_name: format!("{cluster}-node-nsg"),
            location: location.to_string(),
            vm_type: "standard".to_string(),
            vnet_name: format!("{cluster}-vnet"),
            vnet_resource_group: resource_group.to_string(),
            subnet_name: format!("{cluster}-node-subnet"),
            route_table_name: format!("{cluster}-node-routetable"),
            load_balancer_sku: "standard".to_string(),
            maximum_load_balancer_rule_count: MAX_LOAD_BALANCER_RULES,
            use_managed_identity_extension: false,
            use_instance_metadata: true,
        }
    }

    pub fn render(&self) -> Result<String, ControllerError> {
        serde_json::to_string(self)
            .map_err(|e| ControllerError::Internal(format!("cloud provider config: {e}")))
    }
}
