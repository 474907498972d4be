use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::selector::ListOptions;
use crate::watch::WatchEvent;
use pkg_types::node::Node;

/// Result of a full list: the snapshot plus the version to watch from.
#[derive(Debug, Clone)]
pub struct ListResult<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

/// Ordered stream of changes after a list. An `Err` item means the stream has
/// a gap and the consumer must not trust anything after it.
pub type WatchStream<K> = Pin<Box<dyn Stream<Item = anyhow::Result<WatchEvent<K>>> + Send>>;

/// One remote collection, reachable through list + watch.
///
/// Transport, retries and backoff belong to implementors. Consumers assume events
/// arrive in order and that a fresh list can always be requested.
#[async_trait]
pub trait ListWatch: Send + Sync {
    type Object: Send + Sync + 'static;

    async fn list(&self, options: &ListOptions) -> anyhow::Result<ListResult<Self::Object>>;

    async fn watch(
        &self,
        options: &ListOptions,
        resource_version: &str,
    ) -> anyhow::Result<WatchStream<Self::Object>>;
}

/// Direct, uncached node lookup. `Ok(None)` means the node does not exist.
#[async_trait]
pub trait NodeGetter: Send + Sync {
    async fn get_node(&self, name: &str) -> anyhow::Result<Option<Node>>;
}
