//! Reference counting for loaded assets.
//!
//! A `ReferenceCounter` maps asset identities to the number of outstanding
//! claims. The identity is unloaded exactly once, on the release that brings
//! its count back to zero. Counters are plain values: build one per store and
//! share it behind an `Arc` with every loader that talks to that store.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

/// Bound for identities tracked by a `ReferenceCounter`.
pub trait CountKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> CountKey for T {}

/// Physical unload primitive driven by a counter.
pub trait Unloader<K>: Send + Sync {
    /// Unloads `key`. Called at most once per zero crossing, with the
    /// counter's lock held; implementations must not call back into the
    /// counter.
    fn unload(&self, key: &K) -> anyhow::Result<()>;

    /// Identities that are never counted nor unloaded.
    fn is_exempt(&self, _key: &K) -> bool {
        false
    }
}

/// Thread-safe identity → claim count map.
pub struct ReferenceCounter<K: CountKey> {
    counts: Mutex<HashMap<K, usize>>,
    unloader: Arc<dyn Unloader<K>>,
}

impl<K: CountKey> ReferenceCounter<K> {
    pub fn new(unloader: Arc<dyn Unloader<K>>) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            unloader,
        }
    }

    // Release runs during cleanup and must not fail, so a poisoned map is
    // still used.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds one claim on `key`.
    pub fn acquire(&self, key: &K) {
        if self.unloader.is_exempt(key) {
            return;
        }
        let mut counts = self.lock();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        debug!(?key, count = *count, "Asset claim acquired");
    }

    /// Adds one claim on `key` only if `still_loaded` holds.
    ///
    /// The check runs under the same lock as unloads, so a key that passes
    /// it cannot be unloaded before the claim is counted. Exempt keys skip
    /// the check and always succeed.
    pub fn acquire_if(&self, key: &K, still_loaded: impl FnOnce() -> bool) -> bool {
        if self.unloader.is_exempt(key) {
            return true;
        }
        let mut counts = self.lock();
        if !still_loaded() {
            debug!(?key, "Asset gone before it could be claimed");
            return false;
        }
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        debug!(?key, count = *count, "Asset claim acquired");
        true
    }

    /// Drops one claim on `key`, unloading it when no claims remain.
    ///
    /// Unload failures are logged and swallowed.
    pub fn release(&self, key: &K) {
        if self.unloader.is_exempt(key) {
            return;
        }
        let mut counts = self.lock();
        let Some(count) = counts.get_mut(key) else {
            warn!(?key, "Release without a matching acquire ignored");
            return;
        };
        *count -= 1;
        if *count > 0 {
            debug!(?key, count = *count, "Asset claim released");
            return;
        }

        counts.remove(key);
        debug!(?key, "Last asset claim released, unloading");
        if let Err(err) = self.unloader.unload(key) {
            warn!(?key, error = %err, "Asset unload failed");
        }
    }

    /// Current claim count for `key` (0 when absent).
    pub fn count(&self, key: &K) -> usize {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of identities with at least one claim.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Sum of claims over every identity.
    pub fn total(&self) -> usize {
        self.lock().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<K: CountKey> std::fmt::Debug for ReferenceCounter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCounter")
            .field("counts", &*self.lock())
            .finish_non_exhaustive()
    }
}
