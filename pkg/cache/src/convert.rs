//! Ingestion adapters: one function per upstream shape, each producing the
//! canonical record the mirrors store.

use pkg_constants::dns::CLUSTER_IP_NONE;
use pkg_constants::labels::{LABEL_SERVICE_NAME, LABEL_TOPOLOGY_HOSTNAME};
use pkg_types::endpoint::{self as legacy, Endpoints};
use pkg_types::endpoint_slice::{self as slice, EndpointConditions, v1, v1beta1};
use pkg_types::meta::ObjectReference;
use pkg_types::namespace::Namespace;
use pkg_types::pod::Pod;
use pkg_types::service::Service;

use crate::object::{
    EndpointAddress, EndpointPort, EndpointSubset, EndpointsRecord, NamespaceRecord, Object,
    PodRecord, ServiceRecord, index_key,
};

/// Longest pod name still usable as a DNS label.
const MAX_LABEL_LEN: usize = 63;

pub fn to_service(svc: Service) -> Object {
    let mut cluster_ips = if svc.spec.cluster_ips.is_empty() {
        svc.spec.cluster_ip.into_iter().collect()
    } else {
        svc.spec.cluster_ips
    };
    let headless = cluster_ips.first().is_some_and(|ip| ip == CLUSTER_IP_NONE);
    cluster_ips.retain(|ip| !ip.is_empty() && ip != CLUSTER_IP_NONE);

    let mut external_ips = svc.spec.external_ips;
    external_ips.extend(svc.status.load_balancer.into_iter().filter_map(|lb| lb.ip));

    ServiceRecord {
        index: index_key(&svc.name, &svc.namespace),
        name: svc.name,
        namespace: svc.namespace,
        resource_version: svc.resource_version,
        cluster_ips,
        external_ips,
        external_name: svc.spec.external_name.unwrap_or_default(),
        headless,
    }
    .into()
}

pub fn to_pod(pod: Pod) -> Object {
    PodRecord {
        index: index_key(&pod.name, &pod.namespace),
        name: pod.name,
        namespace: pod.namespace,
        resource_version: pod.resource_version,
        pod_ip: pod.pod_ip.unwrap_or_default(),
    }
    .into()
}

pub fn to_namespace(ns: Namespace) -> Object {
    NamespaceRecord {
        name: ns.name,
        resource_version: ns.resource_version,
        labels: ns.labels,
    }
    .into()
}

fn target_ref_name(target: Option<ObjectReference>) -> String {
    target
        .map(|t| t.name)
        .filter(|name| name.len() <= MAX_LABEL_LEN)
        .unwrap_or_default()
}

/// Legacy endpoints: subsets are kept as-is, minus addresses not yet ready.
pub fn to_endpoints(ep: Endpoints) -> Object {
    let mut index_ips = Vec::new();
    let subsets = ep
        .subsets
        .into_iter()
        .map(|subset| {
            let addresses: Vec<EndpointAddress> = subset
                .addresses
                .into_iter()
                .map(|a| EndpointAddress {
                    ip: a.ip,
                    hostname: a.hostname.unwrap_or_default(),
                    node_name: a.node_name.unwrap_or_default(),
                    target_ref_name: target_ref_name(a.target_ref),
                })
                .collect();
            index_ips.extend(addresses.iter().map(|a| a.ip.clone()));
            EndpointSubset {
                addresses,
                ports: subset.ports.into_iter().map(legacy_port).collect(),
            }
        })
        .collect();

    EndpointsRecord {
        index: index_key(&ep.name, &ep.namespace),
        name: ep.name,
        namespace: ep.namespace,
        resource_version: ep.resource_version,
        subsets,
        index_ips,
    }
    .into()
}

fn legacy_port(p: legacy::EndpointPort) -> EndpointPort {
    EndpointPort {
        name: p.name,
        port: p.port,
        protocol: p.protocol,
    }
}

fn slice_port(p: slice::EndpointPort) -> EndpointPort {
    EndpointPort {
        name: p.name.unwrap_or_default(),
        port: p.port.unwrap_or_default(),
        protocol: p.protocol.unwrap_or_else(|| "TCP".to_string()),
    }
}

/// Unknown readiness counts as ready.
fn is_ready(conditions: &EndpointConditions) -> bool {
    conditions.ready != Some(false)
}

/// One endpoint of a slice, flattened to the fields both slice generations share.
struct SliceEndpoint {
    addresses: Vec<String>,
    hostname: Option<String>,
    node_name: Option<String>,
    target_ref: Option<ObjectReference>,
}

struct SliceParts {
    name: String,
    namespace: String,
    resource_version: String,
    service_name: String,
    endpoints: Vec<SliceEndpoint>,
    ports: Vec<slice::EndpointPort>,
}

/// A slice becomes a single subset holding every ready address.
fn slice_to_record(parts: SliceParts) -> Object {
    let mut subset = EndpointSubset {
        addresses: Vec::new(),
        ports: parts.ports.into_iter().map(slice_port).collect(),
    };
    let mut index_ips = Vec::new();
    for endpoint in parts.endpoints {
        let hostname = endpoint.hostname.unwrap_or_default();
        let node_name = endpoint.node_name.unwrap_or_default();
        let target = target_ref_name(endpoint.target_ref);
        for ip in endpoint.addresses {
            index_ips.push(ip.clone());
            subset.addresses.push(EndpointAddress {
                ip,
                hostname: hostname.clone(),
                node_name: node_name.clone(),
                target_ref_name: target.clone(),
            });
        }
    }

    EndpointsRecord {
        index: index_key(&parts.service_name, &parts.namespace),
        name: parts.name,
        namespace: parts.namespace,
        resource_version: parts.resource_version,
        subsets: vec![subset],
        index_ips,
    }
    .into()
}

pub fn endpoint_slice_to_endpoints(es: v1::EndpointSlice) -> Object {
    let service_name = es
        .labels
        .get(LABEL_SERVICE_NAME)
        .cloned()
        .unwrap_or_default();
    slice_to_record(SliceParts {
        name: es.name,
        namespace: es.namespace,
        resource_version: es.resource_version,
        service_name,
        endpoints: es
            .endpoints
            .into_iter()
            .filter(|e| is_ready(&e.conditions))
            .map(|e| SliceEndpoint {
                addresses: e.addresses,
                hostname: e.hostname,
                node_name: e.node_name,
                target_ref: e.target_ref,
            })
            .collect(),
        ports: es.ports,
    })
}

pub fn endpoint_slice_v1beta1_to_endpoints(es: v1beta1::EndpointSlice) -> Object {
    let service_name = es
        .labels
        .get(LABEL_SERVICE_NAME)
        .cloned()
        .unwrap_or_default();
    slice_to_record(SliceParts {
        name: es.name,
        namespace: es.namespace,
        resource_version: es.resource_version,
        service_name,
        endpoints: es
            .endpoints
            .into_iter()
            .filter(|e| is_ready(&e.conditions))
            .map(|mut e| SliceEndpoint {
                node_name: e.topology.remove(LABEL_TOPOLOGY_HOSTNAME),
                addresses: e.addresses,
                hostname: e.hostname,
                target_ref: e.target_ref,
            })
            .collect(),
        ports: es.ports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::service::{LoadBalancerIngress, ServiceSpec, ServiceStatus};
    use std::collections::HashMap;

    fn make_service(cluster_ip: Option<&str>, cluster_ips: &[&str]) -> Service {
        Service {
            name: "web".to_string(),
            namespace: "default".to_string(),
            resource_version: "7".to_string(),
            spec: ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_string),
                cluster_ips: cluster_ips.iter().map(|s| s.to_string()).collect(),
                external_ips: vec!["203.0.113.7".to_string()],
                ..Default::default()
            },
            status: ServiceStatus {
                load_balancer: vec![
                    LoadBalancerIngress {
                        ip: Some("198.51.100.1".to_string()),
                        hostname: None,
                    },
                    LoadBalancerIngress {
                        ip: None,
                        hostname: Some("lb.example.com".to_string()),
                    },
                ],
            },
            ..Default::default()
        }
    }

    fn make_ref(name: &str) -> Option<ObjectReference> {
        Some(ObjectReference {
            kind: "Pod".to_string(),
            name: name.to_string(),
            namespace: Some("default".to_string()),
        })
    }

    #[test]
    fn service_addresses() {
        let obj = to_service(make_service(Some("10.96.0.10"), &[]));
        let svc = obj.as_service().unwrap();
        assert_eq!(svc.index, "web.default");
        assert_eq!(svc.cluster_ips, vec!["10.96.0.10"]);
        assert_eq!(svc.external_ips, vec!["203.0.113.7", "198.51.100.1"]);
        assert!(!svc.headless);

        let obj = to_service(make_service(Some("10.96.0.10"), &["10.96.0.10", "fd00::a"]));
        assert_eq!(obj.as_service().unwrap().cluster_ips, vec!["10.96.0.10", "fd00::a"]);
    }

    #[test]
    fn none_cluster_ip_is_headless() {
        let obj = to_service(make_service(Some(CLUSTER_IP_NONE), &[]));
        let svc = obj.as_service().unwrap();
        assert!(svc.headless);
        assert!(svc.cluster_ips.is_empty());

        let obj = to_service(make_service(None, &[]));
        assert!(!obj.as_service().unwrap().headless);
    }

    #[test]
    fn legacy_endpoints_keep_ready_addresses() {
        let ep = Endpoints {
            name: "web".to_string(),
            namespace: "default".to_string(),
            subsets: vec![legacy::EndpointSubset {
                addresses: vec![legacy::EndpointAddress {
                    ip: "10.0.0.5".to_string(),
                    hostname: Some("web-0".to_string()),
                    node_name: Some("node-1".to_string()),
                    target_ref: make_ref("web-0"),
                }],
                not_ready_addresses: vec![legacy::EndpointAddress {
                    ip: "10.0.0.6".to_string(),
                    ..Default::default()
                }],
                ports: vec![legacy::EndpointPort {
                    name: "http".to_string(),
                    port: 80,
                    protocol: "TCP".to_string(),
                }],
            }],
            ..Default::default()
        };
        let obj = to_endpoints(ep);
        let rec = obj.as_endpoints().unwrap();
        assert_eq!(rec.index, "web.default");
        assert_eq!(rec.index_ips, vec!["10.0.0.5"]);
        let addr = &rec.subsets[0].addresses[0];
        assert_eq!(addr.hostname, "web-0");
        assert_eq!(addr.node_name, "node-1");
        assert_eq!(addr.target_ref_name, "web-0");
        assert_eq!(rec.subsets[0].ports[0].port, 80);
    }

    #[test]
    fn v1_slice_is_keyed_by_owning_service() {
        let es = v1::EndpointSlice {
            name: "web-abcde".to_string(),
            namespace: "default".to_string(),
            labels: HashMap::from([(LABEL_SERVICE_NAME.to_string(), "web".to_string())]),
            endpoints: vec![
                v1::Endpoint {
                    addresses: vec!["10.0.0.5".to_string()],
                    target_ref: make_ref(&"p".repeat(64)),
                    ..Default::default()
                },
                v1::Endpoint {
                    addresses: vec!["10.0.0.6".to_string()],
                    conditions: EndpointConditions {
                        ready: Some(false),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ],
            ports: vec![slice::EndpointPort::default()],
            ..Default::default()
        };
        let obj = endpoint_slice_to_endpoints(es);
        let rec = obj.as_endpoints().unwrap();
        assert_eq!(rec.name, "web-abcde");
        assert_eq!(rec.index, "web.default");
        assert_eq!(rec.index_ips, vec!["10.0.0.5"]);
        assert_eq!(rec.subsets.len(), 1);
        assert_eq!(rec.subsets[0].addresses[0].target_ref_name, "");
        assert_eq!(
            rec.subsets[0].ports[0],
            EndpointPort {
                name: String::new(),
                port: 0,
                protocol: "TCP".to_string(),
            }
        );
    }

    #[test]
    fn v1beta1_slice_takes_node_from_topology() {
        let es = v1beta1::EndpointSlice {
            name: "web-xyz".to_string(),
            namespace: "default".to_string(),
            labels: HashMap::from([(LABEL_SERVICE_NAME.to_string(), "web".to_string())]),
            endpoints: vec![v1beta1::Endpoint {
                addresses: vec!["10.0.0.5".to_string(), "10.0.0.7".to_string()],
                hostname: Some("web-0".to_string()),
                topology: HashMap::from([(
                    LABEL_TOPOLOGY_HOSTNAME.to_string(),
                    "node-1".to_string(),
                )]),
                ..Default::default()
            }],
            ..Default::default()
        };
        let obj = endpoint_slice_v1beta1_to_endpoints(es);
        let rec = obj.as_endpoints().unwrap();
        assert_eq!(rec.index_ips, vec!["10.0.0.5", "10.0.0.7"]);
        assert!(rec.subsets[0].addresses.iter().all(|a| a.node_name == "node-1"));
        assert!(rec.subsets[0].addresses.iter().all(|a| a.hostname == "web-0"));
    }
}
