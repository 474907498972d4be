//! Watch source / mirror constants.

/// Capacity of the broadcast channel feeding live watch streams.
pub const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Number of recent events an in-memory event log retains for watch resumption.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// How often `k3rs-dns` polls mirror readiness, in milliseconds.
pub const SYNC_POLL_INTERVAL_MS: u64 = 50;

/// How long `k3rs-dns` waits for all mirrors to sync, in seconds.
pub const SYNC_TIMEOUT_SECS: u64 = 10;
