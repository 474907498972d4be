use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::meta::Resource;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Ready,
    NotReady,
    #[default]
    Unknown,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "Ready"),
            NodeStatus::NotReady => write!(f, "NotReady"),
            NodeStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    /// Node address (IP or hostname)
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Resource for Node {
    const KIND: &'static str = "Node";

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> Option<&str> {
        None
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
}
