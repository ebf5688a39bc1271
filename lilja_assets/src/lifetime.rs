//! Asset lifetimes.
//!
//! An `AssetLifetime` collects the handles produced by loads and disposes
//! them together. It is `Active` until the first `dispose`, then `Disposed`
//! for good: handles registered afterwards are disposed on the spot.
//!
//! Lifetimes are internally synchronized so a load still in flight on one
//! task can register into a lifetime that another task is tearing down.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::DisposeError;
use crate::handle::AssetHandle;

#[derive(Default)]
struct LifetimeState {
    handles: Vec<Box<dyn AssetHandle>>,
    disposed: bool,
}

/// Scope owning a group of asset handles.
#[derive(Default)]
pub struct AssetLifetime {
    state: Mutex<LifetimeState>,
}

impl AssetLifetime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LifetimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands `handle` to this lifetime.
    ///
    /// On a disposed lifetime the handle is disposed immediately instead.
    pub fn register(&self, handle: impl AssetHandle + 'static) {
        self.register_boxed(Box::new(handle));
    }

    pub fn register_boxed(&self, mut handle: Box<dyn AssetHandle>) {
        {
            let mut state = self.lock();
            if !state.disposed {
                state.handles.push(handle);
                return;
            }
        }

        debug!("Handle registered after lifetime ended, disposing now");
        if let Err(err) = handle.dispose() {
            warn!(error = %err, "Late handle failed to dispose");
        }
    }

    /// Disposes every registered handle in registration order.
    ///
    /// Only the first call does anything. A failing handle does not stop the
    /// others; all failures are returned together.
    pub fn dispose(&self) -> Result<(), DisposeError> {
        let handles = {
            let mut state = self.lock();
            if state.disposed {
                return Ok(());
            }
            state.disposed = true;
            std::mem::take(&mut state.handles)
        };

        debug!(handles = handles.len(), "Disposing asset lifetime");
        let mut failures = Vec::new();
        for mut handle in handles {
            if let Err(err) = handle.dispose() {
                warn!(error = %err, "Asset handle failed to dispose");
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DisposeError { failures })
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Number of handles currently held.
    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().handles.is_empty()
    }
}

impl Drop for AssetLifetime {
    fn drop(&mut self) {
        // Failures were already logged per handle.
        let _ = self.dispose();
    }
}

impl std::fmt::Debug for AssetLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("AssetLifetime")
            .field("handles", &state.handles.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::handle::FnHandle;

    fn recording(log: &Arc<Mutex<Vec<u32>>>, id: u32) -> FnHandle {
        let log = log.clone();
        FnHandle::new(move || {
            log.lock().unwrap().push(id);
            Ok(())
        })
    }

    #[test]
    fn disposes_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifetime = AssetLifetime::new();
        for id in 1..=3 {
            lifetime.register(recording(&log, id));
        }
        assert_eq!(lifetime.len(), 3);

        lifetime.dispose().unwrap();
        assert!(lifetime.is_disposed());
        assert!(lifetime.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn repeated_dispose_is_a_no_op() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifetime = AssetLifetime::new();
        lifetime.register(recording(&log, 1));

        for _ in 0..4 {
            lifetime.dispose().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn register_after_dispose_disposes_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifetime = AssetLifetime::new();
        lifetime.dispose().unwrap();

        lifetime.register(recording(&log, 7));
        assert_eq!(*log.lock().unwrap(), vec![7]);
        assert!(lifetime.is_empty());
    }

    #[test]
    fn failing_handle_does_not_block_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let lifetime = AssetLifetime::new();
        lifetime.register(recording(&log, 1));
        lifetime.register(FnHandle::new(|| anyhow::bail!("device lost")));
        lifetime.register(recording(&log, 3));

        let err = lifetime.dispose().unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn drop_disposes_handles() {
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let lifetime = AssetLifetime::new();
            let seen = calls.clone();
            lifetime.register(FnHandle::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_may_register_into_its_own_lifetime_while_disposing() {
        let lifetime = Arc::new(AssetLifetime::new());
        let inner = Arc::downgrade(&lifetime);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        lifetime.register(FnHandle::new(move || {
            if let Some(lifetime) = inner.upgrade() {
                lifetime.register(FnHandle::new(move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }));
            }
            Ok(())
        }));

        lifetime.dispose().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
