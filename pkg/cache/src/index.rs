//! Secondary indices over canonical records, and the indexer each mirror starts with.

use pkg_constants::dns::{
    EP_IP_INDEX, EP_NAME_NAMESPACE_INDEX, EXTERNAL_NAME_INDEX, POD_IP_INDEX, SVC_IP_INDEX,
    SVC_NAME_NAMESPACE_INDEX,
};

use crate::error::{CacheError, Result};
use crate::object::Object;
use crate::store::Indexer;

fn mismatch(index: &'static str, expected: &'static str) -> CacheError {
    CacheError::TypeMismatch { index, expected }
}

pub fn pod_ip_index(obj: &Object) -> Result<Vec<String>> {
    let pod = obj.as_pod().ok_or_else(|| mismatch(POD_IP_INDEX, "Pod"))?;
    if pod.pod_ip.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![pod.pod_ip.clone()])
}

pub fn svc_name_namespace_index(obj: &Object) -> Result<Vec<String>> {
    let svc = obj
        .as_service()
        .ok_or_else(|| mismatch(SVC_NAME_NAMESPACE_INDEX, "Service"))?;
    Ok(vec![svc.index.clone()])
}

/// Cluster addresses first, then external addresses.
pub fn svc_ip_index(obj: &Object) -> Result<Vec<String>> {
    let svc = obj.as_service().ok_or_else(|| mismatch(SVC_IP_INDEX, "Service"))?;
    Ok(svc
        .cluster_ips
        .iter()
        .chain(&svc.external_ips)
        .cloned()
        .collect())
}

pub fn svc_external_name_index(obj: &Object) -> Result<Vec<String>> {
    let svc = obj
        .as_service()
        .ok_or_else(|| mismatch(EXTERNAL_NAME_INDEX, "Service"))?;
    if svc.external_name.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![svc.external_name.clone()])
}

pub fn ep_name_namespace_index(obj: &Object) -> Result<Vec<String>> {
    let ep = obj
        .as_endpoints()
        .ok_or_else(|| mismatch(EP_NAME_NAMESPACE_INDEX, "Endpoints"))?;
    Ok(vec![ep.index.clone()])
}

pub fn ep_ip_index(obj: &Object) -> Result<Vec<String>> {
    let ep = obj.as_endpoints().ok_or_else(|| mismatch(EP_IP_INDEX, "Endpoints"))?;
    Ok(ep.index_ips.clone())
}

pub fn service_indexer() -> Indexer<Object> {
    Indexer::new()
        .with_index(SVC_NAME_NAMESPACE_INDEX, svc_name_namespace_index)
        .with_index(SVC_IP_INDEX, svc_ip_index)
        .with_index(EXTERNAL_NAME_INDEX, svc_external_name_index)
}

pub fn pod_indexer() -> Indexer<Object> {
    Indexer::new().with_index(POD_IP_INDEX, pod_ip_index)
}

pub fn endpoints_indexer() -> Indexer<Object> {
    Indexer::new()
        .with_index(EP_NAME_NAMESPACE_INDEX, ep_name_namespace_index)
        .with_index(EP_IP_INDEX, ep_ip_index)
}

pub fn namespace_indexer() -> Indexer<Object> {
    Indexer::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{PodRecord, ServiceRecord};

    fn make_service() -> Object {
        ServiceRecord {
            name: "web".to_string(),
            namespace: "default".to_string(),
            index: "web.default".to_string(),
            cluster_ips: vec!["10.96.0.10".to_string(), "fd00::10".to_string()],
            external_ips: vec!["203.0.113.7".to_string()],
            external_name: "web.example.com".to_string(),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn service_reverse_index_covers_cluster_and_external_addresses() {
        assert_eq!(
            svc_ip_index(&make_service()).unwrap(),
            vec!["10.96.0.10", "fd00::10", "203.0.113.7"]
        );
    }

    #[test]
    fn wrong_kind_is_type_mismatch() {
        let pod: Object = PodRecord {
            name: "web-0".to_string(),
            pod_ip: "10.0.0.5".to_string(),
            ..Default::default()
        }
        .into();
        assert!(matches!(
            svc_ip_index(&pod),
            Err(CacheError::TypeMismatch {
                index: SVC_IP_INDEX,
                expected: "Service"
            })
        ));
        assert!(ep_ip_index(&make_service()).is_err());
        assert_eq!(pod_ip_index(&pod).unwrap(), vec!["10.0.0.5"]);
    }

    #[test]
    fn service_indexer_serves_lookups() {
        let store = service_indexer();
        store.add(make_service()).unwrap();
        assert_eq!(
            store.by_index(SVC_NAME_NAMESPACE_INDEX, "web.default").unwrap().len(),
            1
        );
        assert_eq!(store.by_index(SVC_IP_INDEX, "fd00::10").unwrap().len(), 1);
        assert_eq!(
            store
                .by_index(EXTERNAL_NAME_INDEX, "web.example.com")
                .unwrap()
                .len(),
            1
        );
        assert!(store.by_index(POD_IP_INDEX, "10.0.0.5").is_err());
    }
}
