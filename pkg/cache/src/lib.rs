//! Local, indexed mirror of the cluster objects DNS answers are built from.
//!
//! One informer per kind keeps an [`store::Indexer`] current through list+watch.
//! [`controller::DnsController`] owns the informers, gates the endpoint mirror
//! behind a [`switchboard::EndpointSwitchboard`], and bumps a shared
//! last-modified watermark only when a change affects resolution.

pub mod controller;
pub mod convert;
pub mod error;
pub mod index;
pub mod informer;
pub mod memory;
pub mod metrics;
pub mod object;
pub mod significance;
pub mod store;
pub mod switchboard;

pub use controller::{ClusterCache, ClusterSources, DnsControlOpts, DnsController};
pub use error::{CacheError, Result};
pub use memory::ClusterLogs;
pub use object::{EndpointsRecord, NamespaceRecord, Object, PodRecord, ServiceRecord};
