//! Asset loaders.
//!
//! Callers depend on `dyn AssetLoader` only. Two strategies exist:
//! - `PooledAssetLoader`: the store hands out shared instances; claims are
//!   counted per instance and the instance is unloaded at zero.
//! - `AddressableAssetLoader`: every load produces its own load token;
//!   each claim releases its token.
//!
//! A successful load registers exactly one handle into the caller's
//! lifetime. Failed or cancelled loads give back whatever they acquired
//! before returning.

mod addressable;
mod pooled;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::asset::{AssetType, LoadedAsset};
use crate::config::{LoaderBackend, LoaderConfig};
use crate::error::LoadError;
use crate::lifetime::AssetLifetime;
use crate::store::fs::{FsAddressableStore, FsResourceStore};

pub use addressable::{AddressableAssetLoader, AddressableHandle, AddressableStore, LoadToken};
pub use pooled::{store_counter, PooledAssetLoader, ResourceRef, ResourceStore};

/// Loads assets into a caller-supplied lifetime.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Loads `key` as `ty`.
    ///
    /// Returns `Ok(None)` when nothing of that type exists under `key`.
    async fn load(
        &self,
        key: &str,
        ty: AssetType,
        lifetime: &AssetLifetime,
        cancel: &CancellationToken,
    ) -> Result<Option<LoadedAsset>, LoadError>;

    /// Number of claims currently held through this loader's backend, one
    /// per undisposed handle. Addressable loads also count while in flight;
    /// pooled composites are never counted.
    fn live_claims(&self) -> usize;
}

/// Typed loading on top of `AssetLoader`.
#[async_trait]
pub trait AssetLoaderExt: AssetLoader {
    async fn load_as<T: Any + Send + Sync>(
        &self,
        key: &str,
        lifetime: &AssetLifetime,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<T>>, LoadError> {
        let asset = self.load(key, AssetType::of::<T>(), lifetime, cancel).await?;
        Ok(asset.and_then(|asset| asset.downcast::<T>()))
    }
}

impl<L: AssetLoader + ?Sized> AssetLoaderExt for L {}

/// Builds the file-backed loader selected by `cfg.backend`.
pub async fn build_loader(cfg: &LoaderConfig) -> anyhow::Result<Arc<dyn AssetLoader>> {
    let loader: Arc<dyn AssetLoader> = match cfg.backend {
        LoaderBackend::Pooled => {
            let store = Arc::new(FsResourceStore::new(cfg));
            Arc::new(PooledAssetLoader::new(store))
        }
        LoaderBackend::Addressable => {
            let store = Arc::new(FsAddressableStore::open(cfg).await?);
            Arc::new(AddressableAssetLoader::new(store))
        }
    };
    Ok(loader)
}

fn check_key(key: &str) -> Result<(), LoadError> {
    if key.trim().is_empty() {
        return Err(LoadError::InvalidKey);
    }
    Ok(())
}
