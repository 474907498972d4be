//! Grouped endpoint shapes. `v1` is current; `v1beta1` is its predecessor and
//! differs only in where the owning node is recorded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    #[default]
    IPv4,
    IPv6,
    #[serde(rename = "FQDN")]
    Fqdn,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConditions {
    /// Absent means unknown, which consumers treat as ready.
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub serving: Option<bool>,
    #[serde(default)]
    pub terminating: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointPort {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub protocol: Option<String>,
}

pub mod v1 {
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    use super::{AddressType, EndpointConditions, EndpointPort};
    use crate::meta::ObjectReference;
    use crate::namespaced_resource;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct Endpoint {
        pub addresses: Vec<String>,
        #[serde(default)]
        pub conditions: EndpointConditions,
        #[serde(default)]
        pub hostname: Option<String>,
        #[serde(default)]
        pub node_name: Option<String>,
        #[serde(default)]
        pub target_ref: Option<ObjectReference>,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct EndpointSlice {
        pub name: String,
        pub namespace: String,
        #[serde(default)]
        pub resource_version: String,
        #[serde(default)]
        pub labels: HashMap<String, String>,
        #[serde(default)]
        pub annotations: HashMap<String, String>,
        #[serde(default)]
        pub address_type: AddressType,
        #[serde(default)]
        pub endpoints: Vec<Endpoint>,
        #[serde(default)]
        pub ports: Vec<EndpointPort>,
    }

    namespaced_resource!(EndpointSlice, "EndpointSlice");
}

pub mod v1beta1 {
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    use super::{AddressType, EndpointConditions, EndpointPort};
    use crate::meta::ObjectReference;
    use crate::namespaced_resource;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct Endpoint {
        pub addresses: Vec<String>,
        #[serde(default)]
        pub conditions: EndpointConditions,
        #[serde(default)]
        pub hostname: Option<String>,
        /// Node placement lives here (`kubernetes.io/hostname`) instead of a field.
        #[serde(default)]
        pub topology: HashMap<String, String>,
        #[serde(default)]
        pub target_ref: Option<ObjectReference>,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct EndpointSlice {
        pub name: String,
        pub namespace: String,
        #[serde(default)]
        pub resource_version: String,
        #[serde(default)]
        pub labels: HashMap<String, String>,
        #[serde(default)]
        pub annotations: HashMap<String, String>,
        #[serde(default)]
        pub address_type: AddressType,
        #[serde(default)]
        pub endpoints: Vec<Endpoint>,
        #[serde(default)]
        pub ports: Vec<EndpointPort>,
    }

    namespaced_resource!(EndpointSlice, "EndpointSlice");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_type_wire_names() {
        assert_eq!(serde_json::to_string(&AddressType::Fqdn).unwrap(), r#""FQDN""#);
        let parsed: AddressType = serde_json::from_str(r#""IPv6""#).unwrap();
        assert_eq!(parsed, AddressType::IPv6);
    }

    #[test]
    fn missing_conditions_are_unknown() {
        let ep: v1::Endpoint = serde_json::from_str(r#"{"addresses":["10.0.0.5"]}"#).unwrap();
        assert!(ep.conditions.ready.is_none());
    }
}
