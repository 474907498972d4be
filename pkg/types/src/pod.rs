use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::meta::Resource;
use pkg_constants::labels::{FIELD_NAME, FIELD_NAMESPACE, FIELD_POD_PHASE};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PodStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl std::fmt::Display for PodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodStatus::Pending => write!(f, "Pending"),
            PodStatus::Running => write!(f, "Running"),
            PodStatus::Succeeded => write!(f, "Succeeded"),
            PodStatus::Failed => write!(f, "Failed"),
            PodStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub status: PodStatus,
    /// Address assigned by the pod network, once the sandbox exists.
    #[serde(default)]
    pub pod_ip: Option<String>,
    /// The node this pod is assigned to (set by scheduler)
    #[serde(default)]
    pub node_name: Option<String>,
}

impl Resource for Pod {
    const KIND: &'static str = "Pod";

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        Some(&self.namespace)
    }

    fn resource_version(&self) -> &str {
        &self.resource_version
    }

    fn set_resource_version(&mut self, version: String) {
        self.resource_version = version;
    }

    fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    fn fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert(FIELD_NAME.to_string(), self.name.clone());
        fields.insert(FIELD_NAMESPACE.to_string(), self.namespace.clone());
        fields.insert(FIELD_POD_PHASE.to_string(), self.status.to_string());
        fields
    }
}
