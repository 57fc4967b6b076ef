use std::sync::Arc;
use std::sync::RwLock;

use crate::CacheConfig;

/// Atomically publishes the current effective tunables of one cache.
///
/// Readers take a snapshot once per logical operation so that a single
/// update sees a consistent view even if a hot reload lands mid-operation.
/// Writes are rare (dynamic-config pushes), reads happen on every tick.
#[derive(Debug)]
pub struct ConfigView {
    current: RwLock<Arc<CacheConfig>>,
}

impl ConfigView {
    pub fn new(initial: CacheConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Snapshot of the effective config. Cheap; holds the lock only for the
    /// refcount bump.
    pub fn read(&self) -> Arc<CacheConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A writer never panics while holding the lock, but a poisoned
            // view must still serve snapshots.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publishes a new effective config. In-flight operations keep the
    /// snapshot they already acquired.
    pub fn assign(&self, config: CacheConfig) {
        let next = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Retired snapshots are reference-counted and freed when the last
    /// in-flight operation drops them; invoked from the cleanup tick for
    /// interface parity with richer snapshot stores.
    pub fn cleanup_stale_snapshots(&self) {}
}
