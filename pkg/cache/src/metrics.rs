use chrono::{DateTime, Utc};
use pkg_constants::dns::SVC_NAME_NAMESPACE_INDEX;
use pkg_metrics::{MetricsRegistry, exponential_buckets};
use std::collections::HashMap;
use tracing::debug;

use crate::object::Object;
use crate::store::Indexer;

pub const EVENTS_TOTAL: &str = "dns_cache_events_total";
pub const SIGNIFICANT_CHANGES_TOTAL: &str = "dns_cache_significant_changes_total";
pub const MIRRORS_SYNCED: &str = "dns_cache_mirrors_synced";
pub const PROGRAMMING_DURATION: &str = "dns_programming_duration_seconds";

/// Metrics recorded by the cache.
pub struct CacheMetrics {
    registry: MetricsRegistry,
}

impl CacheMetrics {
    pub fn new() -> Self {
        let registry = MetricsRegistry::new();
        registry.register_counter(EVENTS_TOTAL, "Add, update and delete events applied to the mirrors");
        registry.register_counter(
            SIGNIFICANT_CHANGES_TOTAL,
            "Events that advanced the last-modified watermark",
        );
        registry.register_gauge(MIRRORS_SYNCED, "Mirrors that completed their initial list");
        registry.register_histogram(
            PROGRAMMING_DURATION,
            "Time from an endpoint change to the cache observing it, headless services only",
            &exponential_buckets(0.001, 2.0, 20),
        );
        Self { registry }
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn event(&self) {
        self.registry.counter_inc(EVENTS_TOTAL);
    }

    pub fn significant_change(&self) {
        self.registry.counter_inc(SIGNIFICANT_CHANGES_TOTAL);
    }

    pub fn set_mirrors_synced(&self, count: usize) {
        self.registry.gauge_set(MIRRORS_SYNCED, count as i64);
    }

    pub fn render(&self) -> String {
        self.registry.render()
    }

    /// Observe DNS programming latency for an endpoint group owned by `service_key`.
    ///
    /// Only recorded when exactly one owning service exists and it is headless; other
    /// services answer with their virtual address, which does not move with endpoints.
    pub fn record_programming_latency(
        &self,
        services: &Indexer<Object>,
        service_key: &str,
        annotations: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) {
        let Some(raw) = annotations.get(pkg_constants::labels::ANNOTATION_LAST_CHANGE_TRIGGER_TIME)
        else {
            return;
        };
        let owners = services
            .by_index(SVC_NAME_NAMESPACE_INDEX, service_key)
            .unwrap_or_default();
        let [owner] = owners.as_slice() else {
            return;
        };
        if !owner.as_service().is_some_and(|s| s.headless) {
            return;
        }
        let triggered = match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                debug!("Ignoring trigger time '{}' on {}: {}", raw, service_key, e);
                return;
            }
        };
        let elapsed = (now - triggered).num_milliseconds().max(0) as f64 / 1000.0;
        self.registry.histogram_observe(PROGRAMMING_DURATION, elapsed);
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
