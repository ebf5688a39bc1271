//! Loader over an addressable store.
//!
//! Each load owns a `LoadToken` from the moment it starts. The token is
//! released exactly once: by the registered handle, or by the load itself
//! when it fails, finds nothing, or is cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{check_key, AssetLoader};
use crate::asset::{AssetType, LoadedAsset};
use crate::error::LoadError;
use crate::handle::AssetHandle;
use crate::lifetime::AssetLifetime;

/// Opaque id of one in-flight or completed addressable load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadToken(pub u64);

/// Store resolving keys through a catalog, one token per load.
///
/// `release` is not assumed to be idempotent.
#[async_trait]
pub trait AddressableStore: Send + Sync {
    /// Starts loading `key` and returns the token owning the operation.
    fn begin_load(&self, key: &str, ty: AssetType) -> anyhow::Result<LoadToken>;

    /// Waits for the operation. `Ok(None)` means the key did not resolve.
    async fn complete(&self, token: LoadToken) -> anyhow::Result<Option<LoadedAsset>>;

    fn is_valid(&self, token: LoadToken) -> bool;

    fn release(&self, token: LoadToken) -> anyhow::Result<()>;

    /// Tokens not yet released.
    fn live_tokens(&self) -> usize;
}

/// Claim on one addressable load token.
pub struct AddressableHandle {
    store: Arc<dyn AddressableStore>,
    token: Option<LoadToken>,
}

impl AddressableHandle {
    fn new(store: Arc<dyn AddressableStore>, token: LoadToken) -> Self {
        Self {
            store,
            token: Some(token),
        }
    }

    pub fn token(&self) -> Option<LoadToken> {
        self.token
    }
}

impl AssetHandle for AddressableHandle {
    fn dispose(&mut self) -> anyhow::Result<()> {
        match self.token.take() {
            Some(token) if self.store.is_valid(token) => self.store.release(token),
            _ => Ok(()),
        }
    }

    fn is_disposed(&self) -> bool {
        self.token.is_none()
    }
}

impl Drop for AddressableHandle {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(error = %err, "Failed to release addressable load");
        }
    }
}

/// `AssetLoader` over an `AddressableStore`.
pub struct AddressableAssetLoader {
    store: Arc<dyn AddressableStore>,
}

impl AddressableAssetLoader {
    pub fn new(store: Arc<dyn AddressableStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AssetLoader for AddressableAssetLoader {
    async fn load(
        &self,
        key: &str,
        ty: AssetType,
        lifetime: &AssetLifetime,
        cancel: &CancellationToken,
    ) -> Result<Option<LoadedAsset>, LoadError> {
        check_key(key)?;
        let backend = |source: anyhow::Error| LoadError::Backend {
            key: key.to_string(),
            source,
        };

        let token = self.store.begin_load(key, ty).map_err(backend)?;
        // Owns the token until it is registered; dropping releases it.
        let handle = AddressableHandle::new(self.store.clone(), token);

        let completed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(key, ?token, "Addressable load cancelled");
                return Err(LoadError::Cancelled { key: key.to_string() });
            }
            completed = self.store.complete(token) => completed,
        };

        let Some(asset) = completed.map_err(backend)? else {
            debug!(key, ?token, "Addressable key did not resolve");
            return Ok(None);
        };
        if !asset.is_type(ty) {
            debug!(key, ty = ty.name, "Addressable asset has a different type");
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(LoadError::Cancelled {
                key: key.to_string(),
            });
        }

        lifetime.register(handle);
        debug!(key, ?token, "Addressable asset loaded");
        Ok(Some(asset))
    }

    fn live_claims(&self) -> usize {
        self.store.live_tokens()
    }
}
