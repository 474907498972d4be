use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::meta::ObjectReference;
use crate::namespaced_resource;

/// An address of a backend pod serving a Service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub ip: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub target_ref: Option<ObjectReference>,
}

/// A port exposed by a backend pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointPort {
    #[serde(default)]
    pub name: String,
    pub port: i32,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

pub(crate) fn default_protocol() -> String {
    "TCP".to_string()
}

/// A group of addresses sharing the same set of ports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointSubset {
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,
    #[serde(default)]
    pub not_ready_addresses: Vec<EndpointAddress>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

/// Legacy, ungrouped endpoints object. Named after the Service it backs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoints {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

namespaced_resource!(Endpoints, "Endpoints");
