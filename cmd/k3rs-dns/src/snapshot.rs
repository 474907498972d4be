use pkg_cache::ClusterLogs;
use pkg_cache::switchboard::ApiCapabilities;
use pkg_types::endpoint::Endpoints;
use pkg_types::endpoint_slice::{v1, v1beta1};
use pkg_types::namespace::Namespace;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::service::Service;
use serde::Deserialize;

/// Endpoint APIs the snapshotted control plane serves.
#[derive(Debug, Clone, Deserialize)]
pub struct Capabilities {
    #[serde(default = "served", alias = "endpoint-slice-v1")]
    pub endpoint_slice_v1: bool,
    #[serde(default, alias = "endpoint-slice-v1beta1")]
    pub endpoint_slice_v1beta1: bool,
}

fn served() -> bool {
    true
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            endpoint_slice_v1: true,
            endpoint_slice_v1beta1: false,
        }
    }
}

impl From<&Capabilities> for ApiCapabilities {
    fn from(caps: &Capabilities) -> Self {
        ApiCapabilities {
            endpoint_slice_v1: caps.endpoint_slice_v1,
            endpoint_slice_v1beta1: caps.endpoint_slice_v1beta1,
        }
    }
}

/// Cluster state file (YAML) the cache is primed from.
///
/// ```yaml
/// capabilities: { endpoint-slice-v1: true }
/// services:
///   - { name: dns, namespace: kube-system, spec: { cluster_ip: 10.96.0.10 } }
/// endpoint-slices:
///   - name: dns-abcde
///     namespace: kube-system
///     labels: { kubernetes.io/service-name: dns }
///     endpoints: [{ addresses: [10.0.0.5] }]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub endpoints: Vec<Endpoints>,
    #[serde(default, alias = "endpoint-slices")]
    pub endpoint_slices: Vec<v1::EndpointSlice>,
    #[serde(default, alias = "endpoint-slices-v1beta1")]
    pub endpoint_slices_v1beta1: Vec<v1beta1::EndpointSlice>,
}

impl ClusterSnapshot {
    /// Write every object into its kind's event log.
    pub async fn seed(self, logs: &ClusterLogs) -> usize {
        let mut count = 0;
        for ns in self.namespaces {
            logs.namespaces.put(ns).await;
            count += 1;
        }
        for node in self.nodes {
            logs.nodes.put(node).await;
            count += 1;
        }
        for svc in self.services {
            logs.services.put(svc).await;
            count += 1;
        }
        for pod in self.pods {
            logs.pods.put(pod).await;
            count += 1;
        }
        for ep in self.endpoints {
            logs.endpoints.put(ep).await;
            count += 1;
        }
        for es in self.endpoint_slices {
            logs.endpoint_slices.put(es).await;
            count += 1;
        }
        for es in self.endpoint_slices_v1beta1 {
            logs.endpoint_slices_v1beta1.put(es).await;
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"
capabilities:
  endpoint-slice-v1: false
  endpoint-slice-v1beta1: true
services:
  - name: dns
    namespace: kube-system
    spec:
      cluster_ip: 10.96.0.10
endpoint-slices-v1beta1:
  - name: dns-abcde
    namespace: kube-system
    labels:
      kubernetes.io/service-name: dns
    endpoints:
      - addresses: [10.0.0.5]
        topology:
          kubernetes.io/hostname: node-1
"#;

    #[tokio::test]
    async fn parses_and_seeds() {
        let snapshot: ClusterSnapshot = serde_yaml::from_str(SNAPSHOT).unwrap();
        let caps = ApiCapabilities::from(&snapshot.capabilities);
        assert!(!caps.endpoint_slice_v1);
        assert!(caps.endpoint_slice_v1beta1);

        let logs = ClusterLogs::with_capacity(16);
        assert_eq!(snapshot.seed(&logs).await, 2);
        assert!(logs.services.get("kube-system/dns").await.is_some());
        assert_eq!(logs.endpoint_slices_v1beta1.current_seq().await, 1);
    }

    #[test]
    fn capabilities_default_to_v1() {
        let snapshot: ClusterSnapshot = serde_yaml::from_str("services: []").unwrap();
        assert!(snapshot.capabilities.endpoint_slice_v1);
    }
}
