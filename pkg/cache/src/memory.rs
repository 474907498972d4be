use pkg_constants::state::EVENT_LOG_CAPACITY;
use pkg_state::watch::EventLog;
use pkg_types::endpoint::Endpoints;
use pkg_types::endpoint_slice::{v1, v1beta1};
use pkg_types::namespace::Namespace;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::service::Service;
use std::sync::Arc;

use crate::controller::ClusterSources;

/// One in-memory event log per kind, wired up as cluster sources.
#[derive(Clone)]
pub struct ClusterLogs {
    pub services: EventLog<Service>,
    pub pods: EventLog<Pod>,
    pub endpoints: EventLog<Endpoints>,
    pub endpoint_slices: EventLog<v1::EndpointSlice>,
    pub endpoint_slices_v1beta1: EventLog<v1beta1::EndpointSlice>,
    pub namespaces: EventLog<Namespace>,
    pub nodes: EventLog<Node>,
}

impl ClusterLogs {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            services: EventLog::new(max_events),
            pods: EventLog::new(max_events),
            endpoints: EventLog::new(max_events),
            endpoint_slices: EventLog::new(max_events),
            endpoint_slices_v1beta1: EventLog::new(max_events),
            namespaces: EventLog::new(max_events),
            nodes: EventLog::new(max_events),
        }
    }

    pub fn sources(&self) -> ClusterSources {
        ClusterSources {
            services: Arc::new(self.services.clone()),
            pods: Arc::new(self.pods.clone()),
            endpoints: Arc::new(self.endpoints.clone()),
            endpoint_slices: Arc::new(self.endpoint_slices.clone()),
            endpoint_slices_v1beta1: Arc::new(self.endpoint_slices_v1beta1.clone()),
            namespaces: Arc::new(self.namespaces.clone()),
            nodes: Arc::new(self.nodes.clone()),
        }
    }
}

impl Default for ClusterLogs {
    fn default() -> Self {
        Self::new()
    }
}
