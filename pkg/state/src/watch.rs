use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use crate::selector::{ListOptions, ObjectFilter};
use crate::source::{ListResult, ListWatch, NodeGetter, WatchStream};
use pkg_constants::state::WATCH_CHANNEL_CAPACITY;
use pkg_types::meta::Resource;
use pkg_types::node::Node;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A single watch event representing a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent<K> {
    pub seq: u64,
    pub event_type: EventType,
    pub object: K,
}

/// In-memory collection of one kind that records every mutation with a monotonic
/// sequence number and serves it through `ListWatch`.
///
/// The sequence number doubles as the resource version: `put` stamps it onto
/// the stored object, and `watch` resumes from it.
#[derive(Clone)]
pub struct EventLog<K> {
    inner: Arc<RwLock<EventLogInner<K>>>,
}

struct EventLogInner<K> {
    seq: u64,
    objects: BTreeMap<String, K>,
    /// Ring buffer of recent events (capped)
    events: VecDeque<Recorded<K>>,
    max_events: usize,
    sender: broadcast::Sender<Recorded<K>>,
}

/// An event together with the stored object it replaced.
#[derive(Clone)]
struct Recorded<K> {
    event: WatchEvent<K>,
    previous: Option<K>,
}

impl<K: Resource> Recorded<K> {
    /// The event as seen through `filter`. An object that starts matching is
    /// reported as added and one that stops matching as deleted.
    fn project(self, filter: &ObjectFilter) -> Option<WatchEvent<K>> {
        let Recorded { mut event, previous } = self;
        let was_visible = previous.as_ref().is_some_and(|p| filter.admits(p));
        let visible = filter.admits(&event.object);
        event.event_type = match (event.event_type, was_visible, visible) {
            (EventType::Added, _, true) => EventType::Added,
            (EventType::Modified, true, true) => EventType::Modified,
            (EventType::Modified, false, true) => EventType::Added,
            (EventType::Modified, true, false) => EventType::Deleted,
            (EventType::Deleted, was, now) if was || now => EventType::Deleted,
            _ => return None,
        };
        Some(event)
    }
}

impl<K: Resource + Clone + Send + Sync + 'static> EventLog<K> {
    /// Create a new event log with the given capacity for recent events.
    pub fn new(max_events: usize) -> Self {
        let (sender, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                objects: BTreeMap::new(),
                events: VecDeque::with_capacity(max_events),
                max_events,
                sender,
            })),
        }
    }

    /// Create or replace an object, stamping a fresh resource version.
    /// Returns the new version.
    pub async fn put(&self, mut obj: K) -> u64 {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let seq = inner.seq;
        obj.set_resource_version(seq.to_string());

        let previous = inner.objects.insert(obj.key(), obj.clone());
        let event_type = if previous.is_some() {
            EventType::Modified
        } else {
            EventType::Added
        };
        inner.record(
            WatchEvent {
                seq,
                event_type,
                object: obj,
            },
            previous,
        );
        seq
    }

    /// Delete an object by `<namespace>/<name>` key.
    pub async fn delete(&self, key: &str) -> Option<K> {
        let mut inner = self.inner.write().await;
        let previous = inner.objects.remove(key)?;
        inner.seq += 1;
        let seq = inner.seq;
        let mut obj = previous.clone();
        obj.set_resource_version(seq.to_string());
        inner.record(
            WatchEvent {
                seq,
                event_type: EventType::Deleted,
                object: obj.clone(),
            },
            Some(previous),
        );
        Some(obj)
    }

    /// Record an event verbatim, keeping the object's resource version as given.
    /// Used to replay writes that did not change the stored version.
    pub async fn emit(&self, event_type: EventType, obj: K) -> u64 {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let seq = inner.seq;
        let key = obj.key();
        let previous = match event_type {
            EventType::Deleted => inner.objects.remove(&key),
            EventType::Added | EventType::Modified => inner.objects.insert(key, obj.clone()),
        };
        inner.record(
            WatchEvent {
                seq,
                event_type,
                object: obj,
            },
            previous,
        );
        seq
    }

    pub async fn get(&self, key: &str) -> Option<K> {
        self.inner.read().await.objects.get(key).cloned()
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Get all events since the given sequence number.
    pub async fn events_since(&self, from_seq: u64) -> Vec<WatchEvent<K>> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|r| r.event.seq > from_seq)
            .map(|r| r.event.clone())
            .collect()
    }

    /// End every open watch stream cleanly. Watchers see end-of-stream, not an error.
    pub async fn expire_watches(&self) {
        let mut inner = self.inner.write().await;
        let (sender, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        inner.sender = sender;
    }
}

impl<K: Clone> EventLogInner<K> {
    fn record(&mut self, event: WatchEvent<K>, previous: Option<K>) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        let recorded = Recorded { event, previous };
        self.events.push_back(recorded.clone());
        // Broadcast to subscribers (ignore errors if no receivers)
        let _ = self.sender.send(recorded);
    }
}

#[async_trait]
impl<K: Resource + Clone + Send + Sync + 'static> ListWatch for EventLog<K> {
    type Object = K;

    async fn list(&self, options: &ListOptions) -> anyhow::Result<ListResult<K>> {
        let filter = ObjectFilter::from_options(options)?;
        let inner = self.inner.read().await;
        let items = inner
            .objects
            .values()
            .filter(|o| filter.admits(*o))
            .cloned()
            .collect();
        Ok(ListResult {
            items,
            resource_version: inner.seq.to_string(),
        })
    }

    async fn watch(
        &self,
        options: &ListOptions,
        resource_version: &str,
    ) -> anyhow::Result<WatchStream<K>> {
        let from_seq: u64 = resource_version
            .parse()
            .map_err(|_| anyhow!("invalid resource version '{}'", resource_version))?;
        let filter = ObjectFilter::from_options(options)?;

        // Subscribe and snapshot under one lock so no event falls between them.
        let inner = self.inner.read().await;
        if let Some(oldest) = inner.events.front()
            && from_seq + 1 < oldest.event.seq
        {
            bail!(
                "resource version {} is too old (oldest retained {})",
                from_seq,
                oldest.event.seq
            );
        }
        let rx = inner.sender.subscribe();
        let buffered: Vec<WatchEvent<K>> = inner
            .events
            .iter()
            .filter(|r| r.event.seq > from_seq)
            .filter_map(|r| r.clone().project(&filter))
            .collect();
        let last_seq = inner.seq;
        drop(inner);

        debug!(
            "{} watch from {}: {} buffered events",
            K::KIND,
            from_seq,
            buffered.len()
        );

        let live = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(recorded) if recorded.event.seq <= last_seq => None,
            Ok(recorded) => recorded.project(&filter).map(Ok),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                Some(Err(anyhow!("watch fell behind by {} events", missed)))
            }
        });

        let combined = tokio_stream::iter(buffered.into_iter().map(Ok)).chain(live);
        Ok(Box::pin(combined))
    }
}

#[async_trait]
impl NodeGetter for EventLog<Node> {
    async fn get_node(&self, name: &str) -> anyhow::Result<Option<Node>> {
        Ok(self.get(name).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::service::Service;
    use std::collections::HashMap;

    fn make_service(name: &str, tier: &str) -> Service {
        Service {
            name: name.to_string(),
            namespace: "default".to_string(),
            labels: HashMap::from([("tier".to_string(), tier.to_string())]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn put_assigns_versions_and_event_types() {
        let log = EventLog::new(16);
        assert_eq!(log.put(make_service("web", "front")).await, 1);
        assert_eq!(log.put(make_service("web", "front")).await, 2);
        assert_eq!(log.put(make_service("db", "back")).await, 3);

        let events = log.events_since(0).await;
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![EventType::Added, EventType::Modified, EventType::Added]
        );
        assert_eq!(log.get("default/web").await.unwrap().resource_version, "2");
    }

    #[tokio::test]
    async fn list_filters_by_label_selector() {
        let log = EventLog::new(16);
        log.put(make_service("web", "front")).await;
        log.put(make_service("db", "back")).await;

        let opts = ListOptions::default().with_label_selector(Some("tier=back".to_string()));
        let result = log.list(&opts).await.unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "db");
        assert_eq!(result.resource_version, "2");
    }

    #[tokio::test]
    async fn watch_replays_buffered_then_streams_live() {
        let log = EventLog::new(16);
        log.put(make_service("web", "front")).await;
        let listed = log.list(&ListOptions::default()).await.unwrap();
        log.put(make_service("db", "back")).await;

        let mut stream = log
            .watch(&ListOptions::default(), &listed.resource_version)
            .await
            .unwrap();
        log.delete("default/web").await;

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, EventType::Added);
        assert_eq!(first.object.name, "db");

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.event_type, EventType::Deleted);
        assert_eq!(second.object.name, "web");
    }

    #[tokio::test]
    async fn selector_transitions_become_adds_and_deletes() {
        let log = EventLog::new(16);
        log.put(make_service("web", "front")).await;
        log.put(make_service("db", "back")).await;
        let opts = ListOptions::default().with_label_selector(Some("tier=front".to_string()));
        let listed = log.list(&opts).await.unwrap();
        assert_eq!(listed.items.len(), 1);

        // Leaves the selector before the watch opens, so it comes from the buffer.
        log.put(make_service("web", "back")).await;
        let mut stream = log.watch(&opts, &listed.resource_version).await.unwrap();
        log.put(make_service("db", "front")).await;
        log.put(make_service("db", "front")).await;
        log.put(make_service("db", "back")).await;
        log.delete("default/db").await;
        log.put(make_service("cache", "front")).await;

        let mut seen = Vec::new();
        for _ in 0..5 {
            let event = stream.next().await.unwrap().unwrap();
            seen.push((event.event_type, event.object.name));
        }
        assert_eq!(
            seen,
            vec![
                (EventType::Deleted, "web".to_string()),
                (EventType::Added, "db".to_string()),
                (EventType::Modified, "db".to_string()),
                (EventType::Deleted, "db".to_string()),
                (EventType::Added, "cache".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn watch_from_compacted_version_fails() {
        let log = EventLog::new(2);
        for i in 0..5 {
            log.put(make_service(&format!("svc-{}", i), "front")).await;
        }
        assert!(log.watch(&ListOptions::default(), "0").await.is_err());
        assert!(log.watch(&ListOptions::default(), "3").await.is_ok());
    }

    #[tokio::test]
    async fn expire_watches_ends_stream_cleanly() {
        let log: EventLog<Service> = EventLog::new(16);
        let mut stream = log.watch(&ListOptions::default(), "0").await.unwrap();
        log.expire_watches().await;
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn node_lookup() {
        let log = EventLog::new(4);
        log.put(Node {
            name: "node-1".to_string(),
            ..Default::default()
        })
        .await;
        assert!(log.get_node("node-1").await.unwrap().is_some());
        assert!(log.get_node("node-2").await.unwrap().is_none());
    }
}
