//! Canonical records held by the mirrors.
//!
//! Upstream shapes are converted into these once, at ingestion (see `convert`).
//! Records are immutable after conversion and shared through `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::store::StoreObject;

/// `<name>.<namespace>`: the key that ties an endpoint group to its service.
pub fn index_key(name: &str, namespace: &str) -> String {
    format!("{}.{}", name, namespace)
}

fn store_key(name: &str, namespace: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub namespace: String,
    pub index: String,
    pub resource_version: String,
    /// Virtual addresses. Empty for headless and external-name services.
    pub cluster_ips: Vec<String>,
    pub external_ips: Vec<String>,
    /// Alias target; empty when unset.
    pub external_name: String,
    pub headless: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointAddress {
    pub ip: String,
    pub hostname: String,
    pub node_name: String,
    pub target_ref_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPort {
    pub name: String,
    pub port: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPort>,
}

/// One endpoint group, normalized from whichever upstream shape backs the mirror.
///
/// `name` is the upstream object's own name (a slice may be one of several for a
/// service); `index` is the owning service's `<name>.<namespace>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointsRecord {
    pub name: String,
    pub namespace: String,
    pub index: String,
    pub resource_version: String,
    pub subsets: Vec<EndpointSubset>,
    /// Every address across all subsets, for the reverse index.
    pub index_ips: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub index: String,
    pub resource_version: String,
    pub pod_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub name: String,
    pub resource_version: String,
    pub labels: HashMap<String, String>,
}

/// A record of any kind, as stored in an indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Service(Arc<ServiceRecord>),
    Endpoints(Arc<EndpointsRecord>),
    Pod(Arc<PodRecord>),
    Namespace(Arc<NamespaceRecord>),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Service(_) => "Service",
            Object::Endpoints(_) => "Endpoints",
            Object::Pod(_) => "Pod",
            Object::Namespace(_) => "Namespace",
        }
    }

    pub fn resource_version(&self) -> &str {
        match self {
            Object::Service(s) => &s.resource_version,
            Object::Endpoints(e) => &e.resource_version,
            Object::Pod(p) => &p.resource_version,
            Object::Namespace(n) => &n.resource_version,
        }
    }

    pub fn as_service(&self) -> Option<&Arc<ServiceRecord>> {
        match self {
            Object::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_endpoints(&self) -> Option<&Arc<EndpointsRecord>> {
        match self {
            Object::Endpoints(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_pod(&self) -> Option<&Arc<PodRecord>> {
        match self {
            Object::Pod(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&Arc<NamespaceRecord>> {
        match self {
            Object::Namespace(n) => Some(n),
            _ => None,
        }
    }
}

impl StoreObject for Object {
    fn key(&self) -> String {
        match self {
            Object::Service(s) => store_key(&s.name, &s.namespace),
            Object::Endpoints(e) => store_key(&e.name, &e.namespace),
            Object::Pod(p) => store_key(&p.name, &p.namespace),
            Object::Namespace(n) => n.name.clone(),
        }
    }
}

impl From<ServiceRecord> for Object {
    fn from(record: ServiceRecord) -> Self {
        Object::Service(Arc::new(record))
    }
}

impl From<EndpointsRecord> for Object {
    fn from(record: EndpointsRecord) -> Self {
        Object::Endpoints(Arc::new(record))
    }
}

impl From<PodRecord> for Object {
    fn from(record: PodRecord) -> Self {
        Object::Pod(Arc::new(record))
    }
}

impl From<NamespaceRecord> for Object {
    fn from(record: NamespaceRecord) -> Self {
        Object::Namespace(Arc::new(record))
    }
}
