//! Loader over a pooled resource store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{check_key, AssetLoader};
use crate::asset::{AssetId, AssetKind, AssetType, LoadedAsset};
use crate::error::LoadError;
use crate::handle::CountedHandle;
use crate::lifetime::AssetLifetime;
use crate::ref_count::{ReferenceCounter, Unloader};

/// Store handing out shared asset instances.
///
/// Loading the same key twice while it is resident yields the same
/// `AssetId`. Unloading is explicit.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Resolves `key` to a resident instance, loading it if needed.
    async fn load(&self, key: &str, ty: AssetType) -> anyhow::Result<Option<LoadedAsset>>;

    /// Frees the resident instance `id`.
    fn unload(&self, id: AssetId) -> anyhow::Result<()>;

    /// Whether instance `id` is still resident.
    fn is_resident(&self, id: AssetId) -> bool;
}

/// Counted identity in a pooled store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub id: AssetId,
    pub kind: AssetKind,
}

impl From<&LoadedAsset> for ResourceRef {
    fn from(asset: &LoadedAsset) -> Self {
        Self {
            id: asset.id,
            kind: asset.kind,
        }
    }
}

struct StoreUnloader {
    store: Arc<dyn ResourceStore>,
}

impl Unloader<ResourceRef> for StoreUnloader {
    fn unload(&self, key: &ResourceRef) -> anyhow::Result<()> {
        self.store.unload(key.id)
    }

    // Composite objects share sub-assets with other instances and cannot be
    // unloaded one by one.
    fn is_exempt(&self, key: &ResourceRef) -> bool {
        key.kind == AssetKind::Composite
    }
}

/// Counter unloading through `store`. Share it between every loader using
/// the same store.
pub fn store_counter(store: Arc<dyn ResourceStore>) -> Arc<ReferenceCounter<ResourceRef>> {
    Arc::new(ReferenceCounter::new(Arc::new(StoreUnloader { store })))
}

/// `AssetLoader` over a `ResourceStore`, counting claims per instance.
pub struct PooledAssetLoader {
    store: Arc<dyn ResourceStore>,
    counter: Arc<ReferenceCounter<ResourceRef>>,
}

impl PooledAssetLoader {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        let counter = store_counter(store.clone());
        Self::with_counter(store, counter)
    }

    /// Uses an existing counter, typically one shared with other loaders of
    /// the same store.
    pub fn with_counter(
        store: Arc<dyn ResourceStore>,
        counter: Arc<ReferenceCounter<ResourceRef>>,
    ) -> Self {
        Self { store, counter }
    }

    pub fn counter(&self) -> &Arc<ReferenceCounter<ResourceRef>> {
        &self.counter
    }

    /// Claims currently held on `asset`.
    pub fn ref_count(&self, asset: &LoadedAsset) -> usize {
        self.counter.count(&ResourceRef::from(asset))
    }
}

#[async_trait]
impl AssetLoader for PooledAssetLoader {
    async fn load(
        &self,
        key: &str,
        ty: AssetType,
        lifetime: &AssetLifetime,
        cancel: &CancellationToken,
    ) -> Result<Option<LoadedAsset>, LoadError> {
        check_key(key)?;

        // A load can hand back an instance whose last claim is released
        // before ours is counted. Such an instance is gone, so load again.
        let (asset, handle) = loop {
            let loaded = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LoadError::Cancelled { key: key.to_string() });
                }
                loaded = self.store.load(key, ty) => loaded,
            };
            let loaded = loaded.map_err(|source| LoadError::Backend {
                key: key.to_string(),
                source,
            })?;
            let Some(asset) = loaded else {
                debug!(key, ty = ty.name, "Pooled asset not found");
                return Ok(None);
            };

            let store = &self.store;
            let id = asset.id;
            let claim = CountedHandle::try_acquire(
                self.counter.clone(),
                ResourceRef::from(&asset),
                || store.is_resident(id),
            );
            match claim {
                Some(handle) => break (asset, handle),
                None => debug!(key, %id, "Pooled asset unloaded before it was claimed"),
            }
        };

        // Dropping the handle before registration gives the claim back and
        // unloads an instance nobody else holds.
        if !asset.is_type(ty) {
            drop(handle);
            debug!(key, ty = ty.name, "Pooled asset has another type");
            return Ok(None);
        }
        if cancel.is_cancelled() {
            drop(handle);
            return Err(LoadError::Cancelled {
                key: key.to_string(),
            });
        }

        lifetime.register(handle);
        debug!(key, id = %asset.id, "Pooled asset loaded");
        Ok(Some(asset))
    }

    fn live_claims(&self) -> usize {
        self.counter.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryResourceStore;

    fn loader() -> (Arc<MemoryResourceStore>, PooledAssetLoader) {
        let store = Arc::new(MemoryResourceStore::new());
        store.insert("ui/logo", AssetKind::Leaf, String::from("logo"));
        store.insert("ui/panel", AssetKind::Composite, String::from("panel"));
        (store.clone(), PooledAssetLoader::new(store))
    }

    #[tokio::test]
    async fn load_registers_one_claim() {
        let (store, loader) = loader();
        let lifetime = AssetLifetime::new();
        let cancel = CancellationToken::new();

        let asset = loader
            .load("ui/logo", AssetType::of::<String>(), &lifetime, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loader.ref_count(&asset), 1);
        assert_eq!(lifetime.len(), 1);

        lifetime.dispose().unwrap();
        assert_eq!(loader.ref_count(&asset), 0);
        assert_eq!(store.unload_count(asset.id), 1);
    }

    #[tokio::test]
    async fn wrong_type_is_not_found() {
        let (store, loader) = loader();
        let lifetime = AssetLifetime::new();

        let asset = loader
            .load("ui/logo", AssetType::of::<u64>(), &lifetime, &CancellationToken::new())
            .await
            .unwrap();
        assert!(asset.is_none());
        assert!(lifetime.is_empty());
        assert!(loader.counter().is_empty());
        assert!(!store.key_is_resident("ui/logo"));
    }

    #[tokio::test]
    async fn live_claims_counts_every_claim() {
        let (_store, loader) = loader();
        let lifetime = AssetLifetime::new();
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            loader
                .load("ui/logo", AssetType::of::<String>(), &lifetime, &cancel)
                .await
                .unwrap();
        }
        assert_eq!(loader.counter().len(), 1);
        assert_eq!(loader.live_claims(), 3);

        lifetime.dispose().unwrap();
        assert_eq!(loader.live_claims(), 0);
    }

    #[tokio::test]
    async fn composite_assets_are_never_unloaded() {
        let (store, loader) = loader();
        let lifetime = AssetLifetime::new();

        let asset = loader
            .load("ui/panel", AssetType::of::<String>(), &lifetime, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loader.ref_count(&asset), 0);

        lifetime.dispose().unwrap();
        assert_eq!(store.unload_count(asset.id), 0);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let (_store, loader) = loader();
        let err = loader
            .load(" ", AssetType::of::<String>(), &AssetLifetime::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidKey));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (store, loader) = loader();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = loader
            .load("ui/logo", AssetType::of::<String>(), &AssetLifetime::new(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(store.load_count(), 0);
    }
}
