//! Filesystem path constants.

/// Default config file path for the DNS cache.
pub const DEFAULT_DNS_CONFIG: &str = "/etc/k3rs/dns-config.yaml";

/// Default cluster snapshot consumed by `k3rs-dns`.
pub const DEFAULT_SNAPSHOT: &str = "/etc/k3rs/cluster-snapshot.yaml";
