use std::{
    collections::BTreeSet,
    fmt,
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use lru::LruCache;

use super::ConfigurationSnapshot;

/// A bounded cache of restricted snapshots.
///
/// Entries are keyed by the source generation they were taken from and the exact set of
/// requested group names. The least recently used entry is evicted once `capacity` is reached,
/// and entries older than `ttl` are treated as absent.
pub struct SnapshotCache {
    entries: Mutex<LruCache<CacheKey, CachedSnapshot>>,
    ttl: Duration,
}

#[derive(PartialEq, Eq, Hash)]
struct CacheKey {
    generation: u64,
    groups: BTreeSet<String>,
}

struct CachedSnapshot {
    snapshot: ConfigurationSnapshot,
    inserted_at: Instant,
}

impl SnapshotCache {
    /// Creates a cache holding at most `capacity` snapshots for `ttl` each.
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        SnapshotCache {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns the cached snapshot for `groups` at `generation`, if present and fresh.
    pub fn get(
        &self,
        generation: u64,
        groups: &BTreeSet<String>,
    ) -> Option<ConfigurationSnapshot> {
        let key = CacheKey {
            generation,
            groups: groups.clone(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = entries
            .get(&key)
            .map(|entry| (entry.inserted_at.elapsed() < self.ttl).then(|| entry.snapshot.clone()));
        match fresh {
            Some(Some(snapshot)) => Some(snapshot),
            Some(None) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Caches `snapshot` as the answer for `groups` at the snapshot's generation.
    pub fn insert(&self, groups: BTreeSet<String>, snapshot: ConfigurationSnapshot) {
        let key = CacheKey {
            generation: snapshot.generation(),
            groups,
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(
            key,
            CachedSnapshot {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of cached entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
