use pkg_types::config::EndpointSourceMode;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::error::{CacheError, Result};
use crate::informer::Controller;
use crate::object::Object;

/// Upstream representation backing the endpoint mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    EndpointSliceV1,
    EndpointSliceV1beta1,
    Endpoints,
}

/// Endpoint APIs the control plane serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiCapabilities {
    pub endpoint_slice_v1: bool,
    pub endpoint_slice_v1beta1: bool,
}

impl EndpointSource {
    /// Newest served representation, falling back to legacy endpoints.
    pub fn detect(caps: &ApiCapabilities) -> Self {
        if caps.endpoint_slice_v1 {
            EndpointSource::EndpointSliceV1
        } else if caps.endpoint_slice_v1beta1 {
            EndpointSource::EndpointSliceV1beta1
        } else {
            EndpointSource::Endpoints
        }
    }

    /// Resolve a configured mode; `auto` defers to `detect`.
    pub fn from_mode(mode: EndpointSourceMode, caps: &ApiCapabilities) -> Self {
        match mode {
            EndpointSourceMode::Auto => Self::detect(caps),
            EndpointSourceMode::EndpointSliceV1 => EndpointSource::EndpointSliceV1,
            EndpointSourceMode::EndpointSliceV1beta1 => EndpointSource::EndpointSliceV1beta1,
            EndpointSourceMode::Endpoints => EndpointSource::Endpoints,
        }
    }
}

impl fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointSource::EndpointSliceV1 => write!(f, "endpointslice-v1"),
            EndpointSource::EndpointSliceV1beta1 => write!(f, "endpointslice-v1beta1"),
            EndpointSource::Endpoints => write!(f, "endpoints"),
        }
    }
}

struct Binding {
    source: EndpointSource,
    controller: Arc<dyn Controller>,
    started: bool,
}

/// The endpoint mirror and its store, swappable as one unit.
///
/// Every read goes through the shared side of one lock and every swap through the
/// exclusive side, so a reader always sees a controller together with its own store.
/// This lock is separate from the store's internal one.
pub struct EndpointSwitchboard {
    binding: RwLock<Binding>,
}

impl EndpointSwitchboard {
    pub fn new(source: EndpointSource, controller: Arc<dyn Controller>) -> Self {
        Self {
            binding: RwLock::new(Binding {
                source,
                controller,
                started: false,
            }),
        }
    }

    /// Replace the backing mirror. Refused once the current one is running.
    pub fn swap(&self, source: EndpointSource, controller: Arc<dyn Controller>) -> Result<()> {
        let mut binding = self.binding.write().unwrap_or_else(PoisonError::into_inner);
        if binding.started {
            return Err(CacheError::AlreadyStarted);
        }
        info!("Endpoint mirror source: {} -> {}", binding.source, source);
        binding.source = source;
        binding.controller = controller;
        Ok(())
    }

    /// Mark the current mirror as running and hand it out to be run.
    pub fn start(&self) -> Result<Arc<dyn Controller>> {
        let mut binding = self.binding.write().unwrap_or_else(PoisonError::into_inner);
        if binding.started {
            return Err(CacheError::AlreadyStarted);
        }
        binding.started = true;
        Ok(binding.controller.clone())
    }

    /// Run `f` against a consistent source/controller pair.
    pub fn read<R>(&self, f: impl FnOnce(EndpointSource, &dyn Controller) -> R) -> R {
        let binding = self.binding.read().unwrap_or_else(PoisonError::into_inner);
        f(binding.source, binding.controller.as_ref())
    }

    pub fn source(&self) -> EndpointSource {
        self.read(|source, _| source)
    }

    pub fn has_synced(&self) -> bool {
        self.read(|_, c| c.has_synced())
    }

    pub fn list(&self) -> Vec<Object> {
        self.read(|_, c| c.store().list())
    }

    pub fn by_index(&self, name: &str, value: &str) -> Result<Vec<Object>> {
        self.read(|_, c| c.store().by_index(name, value))
    }
}
