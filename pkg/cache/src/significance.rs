//! Decides which changes are visible to DNS consumers, and tracks when the last
//! such change happened.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::warn;

use crate::informer::ResourceEventHandler;
use crate::metrics::CacheMetrics;
use crate::object::{EndpointSubset, EndpointsRecord, Object};

/// Unix time (seconds) of the last significant change.
///
/// Written only by [`ChangeDetector`]; read lock-free by cache-freshness checks.
/// Never moves backwards.
#[derive(Debug, Default)]
pub struct Modified(AtomicI64);

impl Modified {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn touch(&self) {
        self.touch_at(Utc::now().timestamp());
    }

    pub fn touch_at(&self, unix_secs: i64) {
        self.0.fetch_max(unix_secs, Ordering::AcqRel);
    }
}

/// Whether replacing `old` with `new` can change a DNS answer.
pub fn is_significant(old: &Object, new: &Object) -> bool {
    if old.resource_version() == new.resource_version() {
        return false;
    }
    match (old, new) {
        (Object::Service(_), Object::Service(_)) | (Object::Pod(_), Object::Pod(_)) => true,
        (Object::Endpoints(a), Object::Endpoints(b)) => !endpoints_equivalent(a, b),
        _ => {
            warn!("Updates for {} not supported", new.kind());
            false
        }
    }
}

/// Positional comparison of subsets, addresses and ports.
///
/// Relies on upstream keeping a stable order; equal content in a different order
/// compares as changed.
pub fn endpoints_equivalent(a: &EndpointsRecord, b: &EndpointsRecord) -> bool {
    a.subsets.len() == b.subsets.len()
        && a
            .subsets
            .iter()
            .zip(&b.subsets)
            .all(|(sa, sb)| subsets_equivalent(sa, sb))
}

pub fn subsets_equivalent(a: &EndpointSubset, b: &EndpointSubset) -> bool {
    if a.addresses.len() != b.addresses.len() || a.ports.len() != b.ports.len() {
        return false;
    }
    let addresses = a
        .addresses
        .iter()
        .zip(&b.addresses)
        .all(|(x, y)| x.ip == y.ip && x.hostname == y.hostname);
    let ports = a
        .ports
        .iter()
        .zip(&b.ports)
        .all(|(x, y)| x.name == y.name && x.port == y.port && x.protocol == y.protocol);
    addresses && ports
}

/// Event handler shared by the service, pod and endpoint mirrors.
pub struct ChangeDetector {
    modified: Arc<Modified>,
    metrics: Arc<CacheMetrics>,
}

impl ChangeDetector {
    pub fn new(modified: Arc<Modified>, metrics: Arc<CacheMetrics>) -> Self {
        Self { modified, metrics }
    }

    fn touch(&self) {
        self.modified.touch();
        self.metrics.significant_change();
    }
}

impl ResourceEventHandler for ChangeDetector {
    fn on_add(&self, _obj: &Object) {
        self.metrics.event();
        self.touch();
    }

    fn on_update(&self, old: &Object, new: &Object) {
        self.metrics.event();
        if is_significant(old, new) {
            self.touch();
        }
    }

    fn on_delete(&self, _obj: &Object) {
        self.metrics.event();
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SIGNIFICANT_CHANGES_TOTAL;
    use crate::object::{EndpointAddress, EndpointPort, NamespaceRecord, PodRecord, ServiceRecord};

    fn make_endpoints(rv: &str, ips: &[&str], port: i32) -> Object {
        EndpointsRecord {
            name: "web".to_string(),
            namespace: "default".to_string(),
            index: "web.default".to_string(),
            resource_version: rv.to_string(),
            subsets: vec![EndpointSubset {
                addresses: ips
                    .iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        hostname: String::new(),
                        node_name: format!("node-{}", rv),
                        target_ref_name: String::new(),
                    })
                    .collect(),
                ports: vec![EndpointPort {
                    name: "http".to_string(),
                    port,
                    protocol: "TCP".to_string(),
                }],
            }],
            index_ips: ips.iter().map(|s| s.to_string()).collect(),
        }
        .into()
    }

    fn make_service(rv: &str) -> Object {
        ServiceRecord {
            name: "web".to_string(),
            namespace: "default".to_string(),
            resource_version: rv.to_string(),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn same_object_is_never_significant() {
        for obj in [make_service("1"), make_endpoints("1", &["10.0.0.5"], 80)] {
            assert!(!is_significant(&obj, &obj));
        }
    }

    #[test]
    fn service_and_pod_updates_are_significant() {
        assert!(is_significant(&make_service("1"), &make_service("2")));
        let pod = |rv: &str| -> Object {
            PodRecord {
                name: "web-0".to_string(),
                resource_version: rv.to_string(),
                ..Default::default()
            }
            .into()
        };
        assert!(is_significant(&pod("1"), &pod("2")));
    }

    #[test]
    fn endpoint_bookkeeping_changes_are_not_significant() {
        // Node name differs with the version; only address and port identity matter.
        let old = make_endpoints("1", &["10.0.0.5", "10.0.0.6"], 80);
        let new = make_endpoints("2", &["10.0.0.5", "10.0.0.6"], 80);
        assert!(!is_significant(&old, &new));
    }

    #[test]
    fn endpoint_membership_changes_are_significant() {
        let old = make_endpoints("1", &["10.0.0.5"], 80);
        assert!(is_significant(&old, &make_endpoints("2", &["10.0.0.7"], 80)));
        assert!(is_significant(&old, &make_endpoints("2", &["10.0.0.5", "10.0.0.7"], 80)));
        assert!(is_significant(&old, &make_endpoints("2", &["10.0.0.5"], 8080)));
    }

    #[test]
    fn reordered_addresses_compare_as_changed() {
        let old = make_endpoints("1", &["10.0.0.5", "10.0.0.6"], 80);
        let new = make_endpoints("2", &["10.0.0.6", "10.0.0.5"], 80);
        assert!(is_significant(&old, &new));
    }

    #[test]
    fn unsupported_kind_is_not_significant() {
        let ns = |rv: &str| -> Object {
            NamespaceRecord {
                name: "default".to_string(),
                resource_version: rv.to_string(),
                ..Default::default()
            }
            .into()
        };
        assert!(!is_significant(&ns("1"), &ns("2")));
    }

    #[test]
    fn modified_only_moves_forward() {
        let modified = Modified::new();
        modified.touch_at(100);
        modified.touch_at(50);
        assert_eq!(modified.get(), 100);
        modified.touch_at(101);
        assert_eq!(modified.get(), 101);
    }

    #[test]
    fn detector_ignores_noise_bursts() {
        let modified = Arc::new(Modified::new());
        let metrics = Arc::new(CacheMetrics::new());
        let detector = ChangeDetector::new(modified.clone(), metrics.clone());

        let base = make_endpoints("1", &["10.0.0.5"], 80);
        for rv in 2..20 {
            detector.on_update(&base, &make_endpoints(&rv.to_string(), &["10.0.0.5"], 80));
        }
        assert_eq!(modified.get(), 0);
        assert_eq!(metrics.registry().counter_get(SIGNIFICANT_CHANGES_TOTAL), Some(0));

        detector.on_add(&base);
        assert!(modified.get() > 0);
        assert_eq!(metrics.registry().counter_get(SIGNIFICANT_CHANGES_TOTAL), Some(1));
    }
}
