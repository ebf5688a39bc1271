//! Lifetimes disposed by lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use lilja_assets::asset::AssetKind;
use lilja_assets::lifecycle::{link_to_scene, link_to_token, SceneEvents, SceneId};
use lilja_assets::lifetime::AssetLifetime;
use lilja_assets::loader::{AssetLoaderExt, PooledAssetLoader};
use lilja_assets::store::memory::MemoryResourceStore;
use tokio_util::sync::CancellationToken;

async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn loader() -> (Arc<MemoryResourceStore>, PooledAssetLoader) {
    let store = Arc::new(MemoryResourceStore::new());
    store.insert("bgm", AssetKind::Leaf, vec![0_u8; 16]);
    (store.clone(), PooledAssetLoader::new(store))
}

#[tokio::test]
async fn destroyed_owner_unloads_its_assets() -> anyhow::Result<()> {
    let (store, loader) = loader();
    let destroyed = CancellationToken::new();
    let lifetime = Arc::new(AssetLifetime::new());
    link_to_token(&lifetime, destroyed.clone());

    let clip = loader
        .load_as::<Vec<u8>>("bgm", &lifetime, &CancellationToken::new())
        .await?;
    assert_eq!(clip.map(|c| c.len()), Some(16));
    assert_eq!(loader.counter().len(), 1);

    destroyed.cancel();
    assert!(eventually(|| lifetime.is_disposed()).await);
    assert!(loader.counter().is_empty());
    assert_eq!(store.total_unloads(), 1);
    Ok(())
}

#[tokio::test]
async fn scene_unload_disposes_each_linked_lifetime_once() -> anyhow::Result<()> {
    let (store, loader) = loader();
    let events = SceneEvents::default();
    let scene = SceneId(3);

    let a = Arc::new(AssetLifetime::new());
    let b = Arc::new(AssetLifetime::new());
    for lifetime in [&a, &b] {
        link_to_scene(lifetime, &events, scene);
        loader
            .load_as::<Vec<u8>>("bgm", lifetime, &CancellationToken::new())
            .await?;
    }
    assert_eq!(loader.counter().len(), 1);

    assert_eq!(events.unloaded(scene), 2);
    assert!(eventually(|| a.is_disposed() && b.is_disposed()).await);
    assert_eq!(store.total_unloads(), 1);

    // A second notification finds no watchers left.
    assert!(eventually(|| events.unloaded(scene) == 0).await);
    Ok(())
}

#[tokio::test]
async fn disposing_first_detaches_the_link() -> anyhow::Result<()> {
    let (store, loader) = loader();
    let destroyed = CancellationToken::new();
    let lifetime = Arc::new(AssetLifetime::new());
    link_to_token(&lifetime, destroyed.clone());
    loader
        .load_as::<Vec<u8>>("bgm", &lifetime, &CancellationToken::new())
        .await?;

    lifetime.dispose()?;
    assert_eq!(store.total_unloads(), 1);

    destroyed.cancel();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.total_unloads(), 1);
    Ok(())
}
