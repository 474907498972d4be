use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// A lightweight, thread-safe metrics registry that renders in Prometheus text exposition format.
///
/// Updates to unregistered names are ignored.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Counter>>,
    gauges: RwLock<BTreeMap<String, Gauge>>,
    histograms: RwLock<BTreeMap<String, Histogram>>,
}

/// Monotonically increasing counter.
pub struct Counter {
    value: AtomicU64,
    help: String,
}

/// Value that can go up or down.
pub struct Gauge {
    value: AtomicI64,
    help: String,
}

/// Cumulative bucketed distribution of observed values.
pub struct Histogram {
    bounds: Vec<f64>,
    /// One slot per bound, plus the `+Inf` slot.
    buckets: Vec<AtomicU64>,
    /// `f64` bits.
    sum: AtomicU64,
    count: AtomicU64,
    help: String,
}

impl Histogram {
    fn new(bounds: &[f64], help: &str) -> Self {
        let mut bounds = bounds.to_vec();
        bounds.sort_by(|a, b| a.total_cmp(b));
        bounds.dedup();
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
            help: help.to_string(),
        }
    }

    fn observe(&self, val: f64) {
        let slot = self
            .bounds
            .iter()
            .position(|b| val <= *b)
            .unwrap_or(self.bounds.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + val).to_bits();
            match self
                .sum
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn render(&self, name: &str, output: &mut String) {
        output.push_str(&format!("# HELP {} {}\n", name, self.help));
        output.push_str(&format!("# TYPE {} histogram\n", name));
        let mut cumulative = 0u64;
        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                name, bound, cumulative
            ));
        }
        cumulative += self.buckets[self.bounds.len()].load(Ordering::Relaxed);
        output.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", name, cumulative));
        output.push_str(&format!(
            "{}_sum {}\n",
            name,
            f64::from_bits(self.sum.load(Ordering::Relaxed))
        ));
        output.push_str(&format!(
            "{}_count {}\n",
            name,
            self.count.load(Ordering::Relaxed)
        ));
    }
}

/// `count` bounds starting at `start`, each `factor` times the previous.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    let mut bounds = Vec::with_capacity(count);
    let mut next = start;
    for _ in 0..count {
        bounds.push(next);
        next *= factor;
    }
    bounds
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a counter. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.entry(name.to_string()).or_insert_with(|| Counter {
            value: AtomicU64::new(0),
            help: help.to_string(),
        });
    }

    /// Register a gauge. If it already exists, this is a no-op.
    pub fn register_gauge(&self, name: &str, help: &str) {
        let mut gauges = self.gauges.write().unwrap_or_else(PoisonError::into_inner);
        gauges.entry(name.to_string()).or_insert_with(|| Gauge {
            value: AtomicI64::new(0),
            help: help.to_string(),
        });
    }

    /// Register a histogram with the given upper bounds. If it already exists, this is a no-op.
    pub fn register_histogram(&self, name: &str, help: &str, bounds: &[f64]) {
        let mut histograms = self
            .histograms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(bounds, help));
    }

    /// Increment a counter by 1.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name, 1);
    }

    /// Increment a counter by a given amount.
    pub fn counter_add(&self, name: &str, val: u64) {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(c) = counters.get(name) {
            c.value.fetch_add(val, Ordering::Relaxed);
        }
    }

    pub fn counter_get(&self, name: &str) -> Option<u64> {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        counters.get(name).map(|c| c.value.load(Ordering::Relaxed))
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, val: i64) {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(g) = gauges.get(name) {
            g.value.store(val, Ordering::Relaxed);
        }
    }

    pub fn gauge_get(&self, name: &str) -> Option<i64> {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        gauges.get(name).map(|g| g.value.load(Ordering::Relaxed))
    }

    /// Record one observation.
    pub fn histogram_observe(&self, name: &str, val: f64) {
        let histograms = self
            .histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(h) = histograms.get(name) {
            h.observe(val);
        }
    }

    /// Number of observations recorded so far.
    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        let histograms = self
            .histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        histograms.get(name).map(|h| h.count.load(Ordering::Relaxed))
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        // Counters
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        for (name, counter) in counters.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                counter.value.load(Ordering::Relaxed)
            ));
        }

        // Gauges
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        for (name, gauge) in gauges.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, gauge.help));
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!(
                "{} {}\n",
                name,
                gauge.value.load(Ordering::Relaxed)
            ));
        }

        // Histograms
        let histograms = self
            .histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (name, histogram) in histograms.iter() {
            histogram.render(name, &mut output);
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
