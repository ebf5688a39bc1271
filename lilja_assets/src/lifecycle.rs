//! Binding lifetimes to external lifecycle events.
//!
//! The core only knows `AssetLifetime::dispose`. The functions here watch
//! an outside signal on a Tokio task and call `dispose` once when it fires:
//! - `link_to_token`: an owner's "destroyed" token is cancelled.
//! - `link_to_scene`: a scene is reported unloaded on a `SceneEvents` bus.
//!
//! Each link registers itself into the lifetime, so disposing the lifetime
//! first stops the watcher. Watchers hold the lifetime weakly and never keep
//! it alive. Both functions must be called inside a Tokio runtime.

use std::sync::{Arc, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handle::AssetHandle;
use crate::lifetime::AssetLifetime;

/// Identifier of a loaded scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(pub u32);

/// Broadcast bus for scene-unloaded notifications.
#[derive(Debug, Clone)]
pub struct SceneEvents {
    tx: broadcast::Sender<SceneId>,
}

impl Default for SceneEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SceneEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Announces that `scene` was unloaded. Returns how many watchers saw it.
    pub fn unloaded(&self, scene: SceneId) -> usize {
        self.tx.send(scene).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SceneId> {
        self.tx.subscribe()
    }
}

/// Registered into the lifetime; stops the watcher task when disposed.
struct LinkHandle {
    watcher: Option<AbortHandle>,
}

impl AssetHandle for LinkHandle {
    fn dispose(&mut self) -> anyhow::Result<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        Ok(())
    }

    fn is_disposed(&self) -> bool {
        self.watcher.is_none()
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

fn dispose_linked(lifetime: &Weak<AssetLifetime>, reason: &str) {
    let Some(lifetime) = lifetime.upgrade() else {
        return;
    };
    debug!(reason, "Lifecycle event ended asset lifetime");
    if let Err(err) = lifetime.dispose() {
        warn!(reason, error = %err, "Linked lifetime disposed with failures");
    }
}

/// Disposes `lifetime` when `destroyed` is cancelled.
pub fn link_to_token(lifetime: &Arc<AssetLifetime>, destroyed: CancellationToken) {
    let target = Arc::downgrade(lifetime);
    let task = tokio::spawn(async move {
        destroyed.cancelled().await;
        dispose_linked(&target, "owner destroyed");
    });
    lifetime.register(LinkHandle {
        watcher: Some(task.abort_handle()),
    });
}

/// Disposes `lifetime` when `scene` is reported unloaded on `events`.
pub fn link_to_scene(lifetime: &Arc<AssetLifetime>, events: &SceneEvents, scene: SceneId) {
    let target = Arc::downgrade(lifetime);
    let mut rx = events.subscribe();
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(unloaded) if unloaded == scene => {
                    dispose_linked(&target, "scene unloaded");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(?scene, skipped, "Scene watcher lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    lifetime.register(LinkHandle {
        watcher: Some(task.abort_handle()),
    });
}
