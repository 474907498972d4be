use async_trait::async_trait;
use pkg_state::selector::ListOptions;
use pkg_state::source::ListWatch;
use pkg_state::watch::{EventType, WatchEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::object::Object;
use crate::store::{Delta, Indexer, StoreObject};

/// Callbacks fired after the store has applied a change.
pub trait ResourceEventHandler: Send + Sync {
    fn on_add(&self, obj: &Object);
    fn on_update(&self, old: &Object, new: &Object);
    fn on_delete(&self, obj: &Object);
}

/// Handler for mirrors nobody needs to hear from.
pub struct NoopHandler;

impl ResourceEventHandler for NoopHandler {
    fn on_add(&self, _obj: &Object) {}
    fn on_update(&self, _old: &Object, _new: &Object) {}
    fn on_delete(&self, _obj: &Object) {}
}

/// A running mirror, independent of the upstream shape feeding it.
#[async_trait]
pub trait Controller: Send + Sync {
    fn kind(&self) -> &'static str;

    /// True once the initial list has been applied to the store.
    fn has_synced(&self) -> bool;

    fn store(&self) -> &Indexer<Object>;

    /// Reconcile until `stop` fires or the source fails.
    async fn run(&self, stop: watch::Receiver<bool>);
}

/// Hook that sees raw upstream objects from watch add/modify events.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// List+watch mirror of one upstream collection of `T`, stored as canonical records.
pub struct Informer<T> {
    kind: &'static str,
    source: Arc<dyn ListWatch<Object = T>>,
    options: ListOptions,
    store: Arc<Indexer<Object>>,
    convert: fn(T) -> Object,
    observer: Option<Observer<T>>,
    handler: Arc<dyn ResourceEventHandler>,
    synced: AtomicBool,
}

enum WatchExit {
    Stopped,
    Closed,
    Failed,
}

impl<T: Send + Sync + 'static> Informer<T> {
    pub fn new(
        kind: &'static str,
        source: Arc<dyn ListWatch<Object = T>>,
        options: ListOptions,
        store: Indexer<Object>,
        convert: fn(T) -> Object,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Self {
        Self {
            kind,
            source,
            options,
            store: Arc::new(store),
            convert,
            observer: None,
            handler,
            synced: AtomicBool::new(false),
        }
    }

    pub fn with_observer(mut self, observer: Observer<T>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Shared handle to the store, for lookups from other mirrors.
    pub fn store_handle(&self) -> Arc<Indexer<Object>> {
        self.store.clone()
    }

    /// Full list, replacing the store content. Returns the version to watch from.
    async fn relist(&self) -> anyhow::Result<String> {
        let listed = self.source.list(&self.options).await?;
        let objects: Vec<Object> = listed.items.into_iter().map(self.convert).collect();
        let count = objects.len();
        for delta in self.store.replace(objects)? {
            match delta {
                Delta::Added(obj) => self.handler.on_add(&obj),
                Delta::Updated { old, new } => self.handler.on_update(&old, &new),
                Delta::Deleted(obj) => self.handler.on_delete(&obj),
            }
        }
        info!(
            "{} mirror listed {} objects (version {})",
            self.kind, count, listed.resource_version
        );
        Ok(listed.resource_version)
    }

    fn apply(&self, event: WatchEvent<T>) {
        match event.event_type {
            EventType::Added | EventType::Modified => {
                if let Some(observer) = &self.observer {
                    observer(&event.object);
                }
                let obj = (self.convert)(event.object);
                match self.store.add(obj.clone()) {
                    Ok(Some(old)) => self.handler.on_update(&old, &obj),
                    Ok(None) => self.handler.on_add(&obj),
                    Err(e) => warn!("{} mirror dropped {}: {}", self.kind, obj.key(), e),
                }
            }
            EventType::Deleted => {
                let obj = (self.convert)(event.object);
                let removed = self.store.delete(&obj.key()).unwrap_or(obj);
                self.handler.on_delete(&removed);
            }
        }
    }

    async fn watch_until_exit(&self, version: &str, stop: &mut watch::Receiver<bool>) -> WatchExit {
        let mut stream = match self.source.watch(&self.options, version).await {
            Ok(s) => s,
            Err(e) => {
                error!("{} mirror watch error: {}", self.kind, e);
                return WatchExit::Failed;
            }
        };
        loop {
            tokio::select! {
                _ = stop.changed() => return WatchExit::Stopped,
                next = stream.next() => match next {
                    Some(Ok(event)) => self.apply(event),
                    Some(Err(e)) => {
                        error!("{} mirror watch error: {}", self.kind, e);
                        return WatchExit::Failed;
                    }
                    None => return WatchExit::Closed,
                },
            }
        }
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Controller for Informer<T> {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    fn store(&self) -> &Indexer<Object> {
        &self.store
    }

    async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!("{} mirror started", self.kind);
        loop {
            if *stop.borrow() {
                break;
            }
            let version = match self.relist().await {
                Ok(v) => v,
                Err(e) => {
                    error!("{} mirror list error: {}", self.kind, e);
                    break;
                }
            };
            self.synced.store(true, Ordering::Release);

            match self.watch_until_exit(&version, &mut stop).await {
                WatchExit::Closed => debug!("{} watch closed, resyncing", self.kind),
                WatchExit::Stopped | WatchExit::Failed => break,
            }
        }
        info!("{} mirror stopped", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::to_service;
    use crate::index::service_indexer;
    use pkg_constants::dns::SVC_IP_INDEX;
    use pkg_state::source::{ListResult, WatchStream};
    use pkg_state::watch::EventLog;
    use pkg_types::service::{Service, ServiceSpec};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ResourceEventHandler for Recorder {
        fn on_add(&self, obj: &Object) {
            self.0.lock().unwrap().push(format!("add {}", obj.key()));
        }
        fn on_update(&self, _old: &Object, new: &Object) {
            self.0.lock().unwrap().push(format!("update {}", new.key()));
        }
        fn on_delete(&self, obj: &Object) {
            self.0.lock().unwrap().push(format!("delete {}", obj.key()));
        }
    }

    fn make_service(name: &str, ip: &str) -> Service {
        Service {
            name: name.to_string(),
            namespace: "default".to_string(),
            spec: ServiceSpec {
                cluster_ip: Some(ip.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn make_informer(log: &EventLog<Service>, handler: Arc<Recorder>) -> Arc<Informer<Service>> {
        Arc::new(Informer::new(
            "Service",
            Arc::new(log.clone()),
            ListOptions::default(),
            service_indexer(),
            to_service,
            handler,
        ))
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn lists_then_follows_watch() {
        let log = EventLog::new(64);
        log.put(make_service("web", "10.96.0.10")).await;
        let recorder = Arc::new(Recorder::default());
        let informer = make_informer(&log, recorder.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = {
            let informer = informer.clone();
            tokio::spawn(async move { informer.run(stop_rx).await })
        };
        wait_for(|| informer.has_synced()).await;
        assert_eq!(informer.store().len(), 1);

        log.put(make_service("web", "10.96.0.11")).await;
        log.put(make_service("db", "10.96.0.12")).await;
        log.delete("default/web").await;
        wait_for(|| recorder.0.lock().unwrap().len() == 4).await;

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                "add default/web",
                "update default/web",
                "add default/db",
                "delete default/web"
            ]
        );
        assert!(informer.store().by_index(SVC_IP_INDEX, "10.96.0.10").unwrap().is_empty());
        assert_eq!(informer.store().by_index(SVC_IP_INDEX, "10.96.0.12").unwrap().len(), 1);

        stop_tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_watch_triggers_relist() {
        let log = EventLog::new(64);
        log.put(make_service("web", "10.96.0.10")).await;
        let recorder = Arc::new(Recorder::default());
        let informer = make_informer(&log, recorder.clone());

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = {
            let informer = informer.clone();
            tokio::spawn(async move { informer.run(stop_rx).await })
        };
        wait_for(|| informer.has_synced()).await;

        // Changes made while no watch is open must still arrive through the relist.
        log.expire_watches().await;
        log.delete("default/web").await;
        log.put(make_service("db", "10.96.0.12")).await;
        wait_for(|| informer.store().get_by_key("default/db").is_some()).await;
        wait_for(|| informer.store().get_by_key("default/web").is_none()).await;

        stop_tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_before_run_exits_unsynced() {
        let log: EventLog<Service> = EventLog::new(8);
        let informer = make_informer(&log, Arc::new(Recorder::default()));
        let (_stop_tx, stop_rx) = watch::channel(true);
        informer.run(stop_rx).await;
        assert!(!informer.has_synced());
    }

    struct FailingSource;

    #[async_trait]
    impl ListWatch for FailingSource {
        type Object = Service;

        async fn list(&self, _options: &ListOptions) -> anyhow::Result<ListResult<Service>> {
            anyhow::bail!("connection refused")
        }

        async fn watch(
            &self,
            _options: &ListOptions,
            _resource_version: &str,
        ) -> anyhow::Result<WatchStream<Service>> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn list_failure_ends_loop_unsynced() {
        let informer = Informer::new(
            "Service",
            Arc::new(FailingSource),
            ListOptions::default(),
            service_indexer(),
            to_service,
            Arc::new(NoopHandler),
        );
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::time::timeout(Duration::from_secs(5), informer.run(stop_rx))
            .await
            .unwrap();
        assert!(!informer.has_synced());
        assert!(informer.store().is_empty());
    }
}
