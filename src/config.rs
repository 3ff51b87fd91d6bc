//! Tunables of a [`ClusterContext`](crate::context::ClusterContext).

use std::time::Duration;

/// Default number of write buffers shared by the connections of one context
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 32;

/// Default initial capacity of a pooled write buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Buffers which grew past this capacity are dropped instead of returned to the pool
pub const DEFAULT_BUFFER_RETAIN_LIMIT: usize = 1024 * 1024;

/// Default time to wait for a pooled buffer before giving up
pub const DEFAULT_WRITER_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Default maximum encoded message size
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default number of restricted snapshots kept by the configuration handler
pub const DEFAULT_SNAPSHOT_CACHE_CAPACITY: usize = 64;

/// Default lifetime of a cached restricted snapshot
pub const DEFAULT_SNAPSHOT_CACHE_TTL_SECS: u64 = 30;

/// Configuration for a [`ClusterContext`](crate::context::ClusterContext)
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of write buffers in the shared pool
    pub buffer_pool_size: usize,
    /// Initial capacity of each pooled buffer
    pub buffer_capacity: usize,
    /// Buffers larger than this are not recycled
    pub buffer_retain_limit: usize,
    /// Bounded wait for a pooled buffer when the pool is exhausted
    pub writer_acquire_timeout: Duration,
    /// Largest frame accepted for reading or writing
    pub max_message_size: usize,
    /// Whether this member runs the cluster configuration service
    pub enable_cluster_configuration: bool,
    /// Number of restricted snapshots kept in the handler's cache (0 disables caching)
    pub snapshot_cache_capacity: usize,
    /// How long a cached restricted snapshot stays valid
    pub snapshot_cache_ttl: Duration,
}

impl Config {
    /// Sets the number of buffers in the shared pool.
    pub fn with_buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }

    /// Sets the bounded wait for a pooled buffer.
    pub fn with_writer_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.writer_acquire_timeout = timeout;
        self
    }

    /// Sets the largest accepted frame.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Enables or disables the cluster configuration service.
    pub fn with_cluster_configuration(mut self, enabled: bool) -> Self {
        self.enable_cluster_configuration = enabled;
        self
    }

    /// Sets the capacity and lifetime of the restricted snapshot cache.
    pub fn with_snapshot_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.snapshot_cache_capacity = capacity;
        self.snapshot_cache_ttl = ttl;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            buffer_retain_limit: DEFAULT_BUFFER_RETAIN_LIMIT,
            writer_acquire_timeout: Duration::from_millis(DEFAULT_WRITER_ACQUIRE_TIMEOUT_MS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            enable_cluster_configuration: true,
            snapshot_cache_capacity: DEFAULT_SNAPSHOT_CACHE_CAPACITY,
            snapshot_cache_ttl: Duration::from_secs(DEFAULT_SNAPSHOT_CACHE_TTL_SECS),
        }
    }
}
