//! Asset handles.
//!
//! A handle is one claim on one loaded asset. Disposing it gives the claim
//! back; every handle here tolerates being disposed any number of times and
//! disposes itself when dropped.

use std::sync::Arc;

use tracing::warn;

use crate::ref_count::{CountKey, ReferenceCounter};

/// A disposable claim owned by an `AssetLifetime`.
pub trait AssetHandle: Send {
    /// Gives the claim back. Only the first call has an effect.
    fn dispose(&mut self) -> anyhow::Result<()>;

    fn is_disposed(&self) -> bool;
}

/// Handle holding one claim on a `ReferenceCounter`.
///
/// The claim is acquired on construction, so a handle dropped before it is
/// registered rolls the count back.
pub struct CountedHandle<K: CountKey> {
    counter: Arc<ReferenceCounter<K>>,
    key: Option<K>,
}

impl<K: CountKey> CountedHandle<K> {
    pub fn acquire(counter: Arc<ReferenceCounter<K>>, key: K) -> Self {
        counter.acquire(&key);
        Self {
            counter,
            key: Some(key),
        }
    }

    /// Like `acquire`, but yields no handle when `still_loaded` fails.
    /// See `ReferenceCounter::acquire_if`.
    pub fn try_acquire(
        counter: Arc<ReferenceCounter<K>>,
        key: K,
        still_loaded: impl FnOnce() -> bool,
    ) -> Option<Self> {
        if !counter.acquire_if(&key, still_loaded) {
            return None;
        }
        Some(Self {
            counter,
            key: Some(key),
        })
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }
}

impl<K: CountKey> AssetHandle for CountedHandle<K> {
    fn dispose(&mut self) -> anyhow::Result<()> {
        if let Some(key) = self.key.take() {
            self.counter.release(&key);
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.key.is_none()
    }
}

impl<K: CountKey> Drop for CountedHandle<K> {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

/// Handle running a closure once on dispose.
pub struct FnHandle {
    on_dispose: Option<Box<dyn FnOnce() -> anyhow::Result<()> + Send>>,
}

impl FnHandle {
    pub fn new(on_dispose: impl FnOnce() -> anyhow::Result<()> + Send + 'static) -> Self {
        Self {
            on_dispose: Some(Box::new(on_dispose)),
        }
    }
}

impl AssetHandle for FnHandle {
    fn dispose(&mut self) -> anyhow::Result<()> {
        match self.on_dispose.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    fn is_disposed(&self) -> bool {
        self.on_dispose.is_none()
    }
}

impl Drop for FnHandle {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(error = %err, "Dropped handle failed to dispose");
        }
    }
}
