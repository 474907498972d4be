use chrono::Utc;
use pkg_constants::dns::{
    EP_IP_INDEX, EP_NAME_NAMESPACE_INDEX, EXTERNAL_NAME_INDEX, POD_IP_INDEX, SVC_IP_INDEX,
    SVC_NAME_NAMESPACE_INDEX,
};
use pkg_constants::labels::{LABEL_SERVICE_NAME, POD_PHASE_FIELD_SELECTOR};
use pkg_state::selector::ListOptions;
use pkg_state::source::{ListWatch, NodeGetter};
use pkg_types::endpoint::Endpoints;
use pkg_types::endpoint_slice::{v1, v1beta1};
use pkg_types::namespace::Namespace;
use pkg_types::node::Node;
use pkg_types::pod::Pod;
use pkg_types::service::Service;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::convert;
use crate::error::{CacheError, Result};
use crate::index::{endpoints_indexer, namespace_indexer, pod_indexer, service_indexer};
use crate::informer::{Controller, Informer, NoopHandler, ResourceEventHandler};
use crate::metrics::CacheMetrics;
use crate::object::{EndpointsRecord, NamespaceRecord, Object, PodRecord, ServiceRecord, index_key};
use crate::significance::{ChangeDetector, Modified};
use crate::store::Indexer;
use crate::switchboard::{EndpointSource, EndpointSwitchboard};

/// Options for building a [`DnsController`].
#[derive(Debug, Clone)]
pub struct DnsControlOpts {
    /// Keep a pod mirror (pod records are verified against it).
    pub init_pod_cache: bool,
    pub init_endpoints_cache: bool,
    pub endpoint_source: EndpointSource,
    /// Applied to services, pods and endpoints.
    pub label_selector: Option<String>,
    /// Applied to namespaces.
    pub namespace_label_selector: Option<String>,
    /// Zones the instance announces itself in.
    pub zones: Vec<String>,
    pub endpoint_name_mode: bool,
}

impl Default for DnsControlOpts {
    fn default() -> Self {
        Self {
            init_pod_cache: false,
            init_endpoints_cache: true,
            endpoint_source: EndpointSource::EndpointSliceV1,
            label_selector: None,
            namespace_label_selector: None,
            zones: Vec::new(),
            endpoint_name_mode: false,
        }
    }
}

/// Upstream collections the controller mirrors, plus direct node lookups.
#[derive(Clone)]
pub struct ClusterSources {
    pub services: Arc<dyn ListWatch<Object = Service>>,
    pub pods: Arc<dyn ListWatch<Object = Pod>>,
    pub endpoints: Arc<dyn ListWatch<Object = Endpoints>>,
    pub endpoint_slices: Arc<dyn ListWatch<Object = v1::EndpointSlice>>,
    pub endpoint_slices_v1beta1: Arc<dyn ListWatch<Object = v1beta1::EndpointSlice>>,
    pub namespaces: Arc<dyn ListWatch<Object = Namespace>>,
    pub nodes: Arc<dyn NodeGetter>,
}

/// Read side of the cache, as consumed by record synthesis.
///
/// Lookups return an empty `Vec` on a miss, and also when the mirror they need
/// is disabled.
pub trait ClusterCache: Send + Sync {
    fn list_services(&self) -> Vec<Arc<ServiceRecord>>;
    fn list_endpoints(&self) -> Vec<Arc<EndpointsRecord>>;
    /// By `<name>.<namespace>`.
    fn services_by_name_namespace(&self, key: &str) -> Vec<Arc<ServiceRecord>>;
    /// By any cluster or external address.
    fn services_by_address(&self, ip: &str) -> Vec<Arc<ServiceRecord>>;
    fn services_by_external_name(&self, name: &str) -> Vec<Arc<ServiceRecord>>;
    fn pods_by_address(&self, ip: &str) -> Vec<Arc<PodRecord>>;
    /// By the owning service's `<name>.<namespace>`.
    fn endpoints_by_name_namespace(&self, key: &str) -> Vec<Arc<EndpointsRecord>>;
    fn endpoints_by_address(&self, ip: &str) -> Vec<Arc<EndpointsRecord>>;
    fn get_namespace_by_name(&self, name: &str) -> Result<Arc<NamespaceRecord>>;
    fn has_synced(&self) -> bool;
    /// Unix seconds of the last significant change.
    fn last_modified(&self) -> i64;
}

/// Builds an endpoint mirror for whichever source the switchboard asks for.
struct EndpointMirrors {
    sources: ClusterSources,
    options: ListOptions,
    handler: Arc<dyn ResourceEventHandler>,
    services: Arc<Indexer<Object>>,
    metrics: Arc<CacheMetrics>,
}

impl EndpointMirrors {
    fn build(&self, source: EndpointSource) -> Arc<dyn Controller> {
        let services = self.services.clone();
        let metrics = self.metrics.clone();
        match source {
            EndpointSource::Endpoints => Arc::new(
                Informer::new(
                    "Endpoints",
                    self.sources.endpoints.clone(),
                    self.options.clone(),
                    endpoints_indexer(),
                    convert::to_endpoints,
                    self.handler.clone(),
                )
                .with_observer(Arc::new(move |ep: &Endpoints| {
                    metrics.record_programming_latency(
                        &services,
                        &index_key(&ep.name, &ep.namespace),
                        &ep.annotations,
                        Utc::now(),
                    )
                })),
            ),
            EndpointSource::EndpointSliceV1 => Arc::new(
                Informer::new(
                    "EndpointSlice",
                    self.sources.endpoint_slices.clone(),
                    self.options.clone(),
                    endpoints_indexer(),
                    convert::endpoint_slice_to_endpoints,
                    self.handler.clone(),
                )
                .with_observer(Arc::new(move |es: &v1::EndpointSlice| {
                    let owner = es.labels.get(LABEL_SERVICE_NAME).map_or("", String::as_str);
                    metrics.record_programming_latency(
                        &services,
                        &index_key(owner, &es.namespace),
                        &es.annotations,
                        Utc::now(),
                    )
                })),
            ),
            EndpointSource::EndpointSliceV1beta1 => Arc::new(
                Informer::new(
                    "EndpointSlice",
                    self.sources.endpoint_slices_v1beta1.clone(),
                    self.options.clone(),
                    endpoints_indexer(),
                    convert::endpoint_slice_v1beta1_to_endpoints,
                    self.handler.clone(),
                )
                .with_observer(Arc::new(move |es: &v1beta1::EndpointSlice| {
                    let owner = es.labels.get(LABEL_SERVICE_NAME).map_or("", String::as_str);
                    metrics.record_programming_latency(
                        &services,
                        &index_key(owner, &es.namespace),
                        &es.annotations,
                        Utc::now(),
                    )
                })),
            ),
        }
    }
}

/// Owns every mirror, runs them together and stops them together.
pub struct DnsController {
    opts: DnsControlOpts,
    nodes: Arc<dyn NodeGetter>,
    modified: Arc<Modified>,
    metrics: Arc<CacheMetrics>,
    services: Arc<Informer<Service>>,
    pods: Option<Arc<Informer<Pod>>>,
    namespaces: Arc<Informer<Namespace>>,
    endpoint_mirrors: EndpointMirrors,
    endpoints: Option<EndpointSwitchboard>,
    /// Set by the first `stop`.
    shutdown: Mutex<bool>,
    stop_tx: watch::Sender<bool>,
}

impl DnsController {
    pub fn new(sources: ClusterSources, opts: DnsControlOpts) -> Self {
        let modified = Arc::new(Modified::new());
        let metrics = Arc::new(CacheMetrics::new());
        let handler: Arc<dyn ResourceEventHandler> =
            Arc::new(ChangeDetector::new(modified.clone(), metrics.clone()));
        let options = ListOptions::default().with_label_selector(opts.label_selector.clone());

        let services = Arc::new(Informer::new(
            "Service",
            sources.services.clone(),
            options.clone(),
            service_indexer(),
            convert::to_service,
            handler.clone(),
        ));

        let pods = opts.init_pod_cache.then(|| {
            Arc::new(Informer::new(
                "Pod",
                sources.pods.clone(),
                options.clone().append_field_selector(POD_PHASE_FIELD_SELECTOR),
                pod_indexer(),
                convert::to_pod,
                handler.clone(),
            ))
        });

        let namespaces = Arc::new(Informer::new(
            "Namespace",
            sources.namespaces.clone(),
            ListOptions::default().with_label_selector(opts.namespace_label_selector.clone()),
            namespace_indexer(),
            convert::to_namespace,
            Arc::new(NoopHandler),
        ));

        let endpoint_mirrors = EndpointMirrors {
            sources: sources.clone(),
            options,
            handler,
            services: services.store_handle(),
            metrics: metrics.clone(),
        };
        let endpoints = opts.init_endpoints_cache.then(|| {
            EndpointSwitchboard::new(
                opts.endpoint_source,
                endpoint_mirrors.build(opts.endpoint_source),
            )
        });

        let (stop_tx, _) = watch::channel(false);
        Self {
            opts,
            nodes: sources.nodes,
            modified,
            metrics,
            services,
            pods,
            namespaces,
            endpoint_mirrors,
            endpoints,
            shutdown: Mutex::new(false),
            stop_tx,
        }
    }

    pub fn opts(&self) -> &DnsControlOpts {
        &self.opts
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// `None` when the endpoint mirror is disabled.
    pub fn endpoint_source(&self) -> Option<EndpointSource> {
        self.endpoints.as_ref().map(|board| board.source())
    }

    fn switch_endpoints(&self, source: EndpointSource) -> Result<()> {
        match &self.endpoints {
            Some(board) => board.swap(source, self.endpoint_mirrors.build(source)),
            None => Ok(()),
        }
    }

    /// Back the endpoint mirror with legacy endpoints.
    pub fn watch_endpoints(&self) -> Result<()> {
        self.switch_endpoints(EndpointSource::Endpoints)
    }

    /// Back the endpoint mirror with `v1beta1` endpoint slices.
    pub fn watch_endpoint_slice_v1beta1(&self) -> Result<()> {
        self.switch_endpoints(EndpointSource::EndpointSliceV1beta1)
    }

    /// Run every mirror until `stop` is called.
    pub async fn run(&self) {
        let mut controllers: Vec<Arc<dyn Controller>> = Vec::new();
        controllers.push(self.services.clone());
        controllers.push(self.namespaces.clone());
        if let Some(pods) = &self.pods {
            controllers.push(pods.clone());
        }
        if let Some(board) = &self.endpoints {
            match board.start() {
                Ok(controller) => controllers.push(controller),
                Err(e) => warn!("Endpoint mirror not started: {}", e),
            }
        }

        let handles: Vec<_> = controllers
            .into_iter()
            .map(|controller| {
                let stop = self.stop_tx.subscribe();
                tokio::spawn(async move { controller.run(stop).await })
            })
            .collect();

        let mut stop = self.stop_tx.subscribe();
        let _ = stop.wait_for(|stopped| *stopped).await;

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Mirror task failed: {}", e);
            }
        }
    }

    /// Start the controller as a background task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            info!(
                "DnsController started (pods={}, endpoints={})",
                this.pods.is_some(),
                this.endpoint_source()
                    .map_or_else(|| "disabled".to_string(), |s| s.to_string())
            );
            this.run().await;
            info!("DnsController stopped");
        })
    }

    /// Signal every mirror to exit. Only the first call succeeds.
    pub fn stop(&self) -> Result<()> {
        let mut shutdown = self.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
        if *shutdown {
            return Err(CacheError::AlreadyStopping);
        }
        *shutdown = true;
        self.stop_tx.send_replace(true);
        Ok(())
    }

    /// Direct lookup against the node source; nodes are not mirrored.
    pub async fn get_node_by_name(&self, name: &str) -> Result<Node> {
        self.nodes
            .get_node(name)
            .await?
            .ok_or_else(|| CacheError::NodeNotFound(name.to_string()))
    }

    fn endpoint_lookup(&self, index: &str, value: &str) -> Vec<Arc<EndpointsRecord>> {
        let Some(board) = &self.endpoints else {
            return Vec::new();
        };
        match board.by_index(index, value) {
            Ok(objs) => objs.iter().filter_map(|o| o.as_endpoints().cloned()).collect(),
            Err(e) => {
                warn!("Endpoint lookup failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn lookup(store: &Indexer<Object>, index: &str, value: &str) -> Vec<Object> {
    store.by_index(index, value).unwrap_or_else(|e| {
        warn!("Lookup failed: {}", e);
        Vec::new()
    })
}

fn services(objs: Vec<Object>) -> Vec<Arc<ServiceRecord>> {
    objs.iter().filter_map(|o| o.as_service().cloned()).collect()
}

impl ClusterCache for DnsController {
    fn list_services(&self) -> Vec<Arc<ServiceRecord>> {
        services(self.services.store().list())
    }

    fn list_endpoints(&self) -> Vec<Arc<EndpointsRecord>> {
        match &self.endpoints {
            Some(board) => board
                .list()
                .iter()
                .filter_map(|o| o.as_endpoints().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    fn services_by_name_namespace(&self, key: &str) -> Vec<Arc<ServiceRecord>> {
        services(lookup(self.services.store(), SVC_NAME_NAMESPACE_INDEX, key))
    }

    fn services_by_address(&self, ip: &str) -> Vec<Arc<ServiceRecord>> {
        services(lookup(self.services.store(), SVC_IP_INDEX, ip))
    }

    fn services_by_external_name(&self, name: &str) -> Vec<Arc<ServiceRecord>> {
        services(lookup(self.services.store(), EXTERNAL_NAME_INDEX, name))
    }

    fn pods_by_address(&self, ip: &str) -> Vec<Arc<PodRecord>> {
        let Some(pods) = &self.pods else {
            return Vec::new();
        };
        lookup(pods.store(), POD_IP_INDEX, ip)
            .iter()
            .filter_map(|o| o.as_pod().cloned())
            .collect()
    }

    fn endpoints_by_name_namespace(&self, key: &str) -> Vec<Arc<EndpointsRecord>> {
        self.endpoint_lookup(EP_NAME_NAMESPACE_INDEX, key)
    }

    fn endpoints_by_address(&self, ip: &str) -> Vec<Arc<EndpointsRecord>> {
        self.endpoint_lookup(EP_IP_INDEX, ip)
    }

    fn get_namespace_by_name(&self, name: &str) -> Result<Arc<NamespaceRecord>> {
        self.namespaces
            .store()
            .get_by_key(name)
            .and_then(|o| o.as_namespace().cloned())
            .ok_or_else(|| CacheError::NamespaceNotFound(name.to_string()))
    }

    /// True once every enabled mirror has finished its initial list.
    fn has_synced(&self) -> bool {
        let mut states = vec![self.services.has_synced(), self.namespaces.has_synced()];
        if let Some(pods) = &self.pods {
            states.push(pods.has_synced());
        }
        if let Some(board) = &self.endpoints {
            states.push(board.has_synced());
        }
        let synced = states.iter().filter(|s| **s).count();
        self.metrics.set_mirrors_synced(synced);
        synced == states.len()
    }

    fn last_modified(&self) -> i64 {
        self.modified.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ClusterLogs;
    use std::time::Duration;

    fn make_controller(logs: &ClusterLogs, opts: DnsControlOpts) -> Arc<DnsController> {
        Arc::new(DnsController::new(logs.sources(), opts))
    }

    async fn wait_synced(controller: &DnsController) {
        for _ in 0..200 {
            if controller.has_synced() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("controller never synced");
    }

    #[tokio::test]
    async fn second_stop_is_an_error() {
        let logs = ClusterLogs::with_capacity(16);
        let controller = make_controller(&logs, DnsControlOpts::default());
        let task = controller.start();
        wait_synced(&controller).await;

        controller.stop().unwrap();
        assert!(matches!(controller.stop(), Err(CacheError::AlreadyStopping)));
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stop_before_start_leaves_mirrors_unsynced() {
        let logs = ClusterLogs::with_capacity(16);
        let controller = make_controller(&logs, DnsControlOpts::default());
        controller.stop().unwrap();
        tokio::time::timeout(Duration::from_secs(5), controller.run())
            .await
            .unwrap();
        assert!(!controller.has_synced());
    }

    #[tokio::test]
    async fn source_swap_only_before_start() {
        let logs = ClusterLogs::with_capacity(16);
        let controller = make_controller(&logs, DnsControlOpts::default());
        controller.watch_endpoint_slice_v1beta1().unwrap();
        controller.watch_endpoints().unwrap();
        assert_eq!(controller.endpoint_source(), Some(EndpointSource::Endpoints));

        let task = controller.start();
        wait_synced(&controller).await;
        assert!(matches!(
            controller.watch_endpoint_slice_v1beta1(),
            Err(CacheError::AlreadyStarted)
        ));
        controller.stop().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn disabled_mirrors_answer_empty() {
        let logs = ClusterLogs::with_capacity(16);
        let opts = DnsControlOpts {
            init_pod_cache: false,
            init_endpoints_cache: false,
            ..Default::default()
        };
        let controller = make_controller(&logs, opts);
        assert_eq!(controller.endpoint_source(), None);
        assert!(controller.watch_endpoints().is_ok());

        let task = controller.start();
        wait_synced(&controller).await;
        assert!(controller.pods_by_address("10.0.0.5").is_empty());
        assert!(controller.endpoints_by_address("10.0.0.5").is_empty());
        assert!(controller.list_endpoints().is_empty());
        controller.stop().unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn remote_lookups_report_not_found() {
        let logs = ClusterLogs::with_capacity(16);
        logs.namespaces
            .put(Namespace {
                name: "default".to_string(),
                ..Default::default()
            })
            .await;
        logs.nodes
            .put(Node {
                name: "node-1".to_string(),
                ..Default::default()
            })
            .await;

        let controller = make_controller(&logs, DnsControlOpts::default());
        let task = controller.start();
        wait_synced(&controller).await;

        assert_eq!(controller.get_namespace_by_name("default").unwrap().name, "default");
        assert!(matches!(
            controller.get_namespace_by_name("kube-system"),
            Err(CacheError::NamespaceNotFound(_))
        ));
        assert_eq!(controller.get_node_by_name("node-1").await.unwrap().name, "node-1");
        assert!(matches!(
            controller.get_node_by_name("node-9").await,
            Err(CacheError::NodeNotFound(_))
        ));

        controller.stop().unwrap();
        task.await.unwrap();
    }
}
