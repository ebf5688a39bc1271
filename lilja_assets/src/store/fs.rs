//! File-backed stores.
//!
//! Keys are paths relative to the configured root. Payloads are decoded by
//! requested type: `Bytes` for raw contents, `String` for UTF-8 text. Any
//! other requested type resolves to nothing.

use std::any::Any;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::asset::{AssetId, AssetKind, AssetType, LoadedAsset};
use crate::config::LoaderConfig;
use crate::loader::{AddressableStore, LoadToken, ResourceStore};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Joins `key` onto `root`, refusing keys that escape it.
fn resolve(root: &Path, key: &str) -> anyhow::Result<PathBuf> {
    let rel = Path::new(key);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        anyhow::bail!("asset key `{key}` must stay inside the asset root");
    }
    Ok(root.join(rel))
}

/// Reads `path`; a missing file is `Ok(None)`.
async fn read_file(path: &Path) -> anyhow::Result<Option<Bytes>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read asset {}", path.display())),
    }
}

fn decode(data: &Bytes, ty: AssetType) -> anyhow::Result<Option<Arc<dyn Any + Send + Sync>>> {
    if ty == AssetType::of::<Bytes>() {
        return Ok(Some(Arc::new(data.clone())));
    }
    if ty == AssetType::of::<String>() {
        let text = String::from_utf8(data.to_vec()).context("asset is not valid UTF-8")?;
        return Ok(Some(Arc::new(text)));
    }
    Ok(None)
}

struct Resident {
    id: AssetId,
    data: Bytes,
}

/// Pooled store caching file contents while they are claimed.
pub struct FsResourceStore {
    config: LoaderConfig,
    resident: Mutex<HashMap<PathBuf, Resident>>,
    next_id: AtomicU64,
}

impl FsResourceStore {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            config: config.clone(),
            resident: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of files currently cached.
    pub fn resident_count(&self) -> usize {
        lock(&self.resident).len()
    }
}

#[async_trait]
impl ResourceStore for FsResourceStore {
    async fn load(&self, key: &str, ty: AssetType) -> anyhow::Result<Option<LoadedAsset>> {
        let path = resolve(&self.config.root, key)?;
        let kind = if self.config.is_composite(&path) {
            AssetKind::Composite
        } else {
            AssetKind::Leaf
        };

        let cached = lock(&self.resident)
            .get(&path)
            .map(|r| (r.id, r.data.clone()));
        if let Some((id, data)) = cached {
            return Ok(decode(&data, ty)?.map(|payload| LoadedAsset::new(id, kind, payload)));
        }

        let Some(data) = read_file(&path).await? else {
            return Ok(None);
        };
        // Only decodable files become resident; anything else would never
        // be claimed and so never unloaded.
        let Some(payload) = decode(&data, ty)? else {
            return Ok(None);
        };
        // Another load may have raced us here; keep the first entry.
        let mut resident = lock(&self.resident);
        let entry = resident.entry(path.clone()).or_insert_with(|| Resident {
            id: AssetId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            data,
        });
        debug!(path = %path.display(), id = %entry.id, "Asset file resident");
        Ok(Some(LoadedAsset::new(entry.id, kind, payload)))
    }

    fn unload(&self, id: AssetId) -> anyhow::Result<()> {
        let mut resident = lock(&self.resident);
        let path = resident
            .iter()
            .find(|(_, r)| r.id == id)
            .map(|(path, _)| path.clone())
            .ok_or_else(|| anyhow::anyhow!("asset {id} is not resident"))?;
        resident.remove(&path);
        debug!(path = %path.display(), %id, "Asset file unloaded");
        Ok(())
    }

    fn is_resident(&self, id: AssetId) -> bool {
        lock(&self.resident).values().any(|r| r.id == id)
    }
}

struct PendingFile {
    key: String,
    ty: AssetType,
}

/// Addressable store resolving keys through a JSON catalog
/// (`{ "key": "relative/path" }`).
pub struct FsAddressableStore {
    root: PathBuf,
    catalog: HashMap<String, PathBuf>,
    tokens: Mutex<HashMap<LoadToken, PendingFile>>,
    next_token: AtomicU64,
}

impl FsAddressableStore {
    /// Reads the catalog named by `config`.
    pub async fn open(config: &LoaderConfig) -> anyhow::Result<Self> {
        let path = config.catalog_path();
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read catalog {}", path.display()))?;
        let catalog: HashMap<String, PathBuf> = serde_json::from_str(&text)
            .with_context(|| format!("parse catalog {}", path.display()))?;
        info!(catalog = %path.display(), entries = catalog.len(), "Addressable catalog loaded");
        Ok(Self::with_catalog(config.root.clone(), catalog))
    }

    pub fn with_catalog(root: PathBuf, catalog: HashMap<String, PathBuf>) -> Self {
        Self {
            root,
            catalog,
            tokens: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl AddressableStore for FsAddressableStore {
    fn begin_load(&self, key: &str, ty: AssetType) -> anyhow::Result<LoadToken> {
        let token = LoadToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        lock(&self.tokens).insert(
            token,
            PendingFile {
                key: key.to_string(),
                ty,
            },
        );
        Ok(token)
    }

    async fn complete(&self, token: LoadToken) -> anyhow::Result<Option<LoadedAsset>> {
        let (key, ty) = lock(&self.tokens)
            .get(&token)
            .map(|p| (p.key.clone(), p.ty))
            .ok_or_else(|| anyhow::anyhow!("unknown load token {token:?}"))?;
        let Some(rel) = self.catalog.get(&key) else {
            return Ok(None);
        };
        let path = resolve(&self.root, &rel.to_string_lossy())?;
        let Some(data) = read_file(&path).await? else {
            return Ok(None);
        };
        Ok(decode(&data, ty)?.map(|payload| LoadedAsset::new(AssetId(token.0), AssetKind::Leaf, payload)))
    }

    fn is_valid(&self, token: LoadToken) -> bool {
        lock(&self.tokens).contains_key(&token)
    }

    fn release(&self, token: LoadToken) -> anyhow::Result<()> {
        lock(&self.tokens)
            .remove(&token)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("load token {token:?} already released"))
    }

    fn live_tokens(&self) -> usize {
        lock(&self.tokens).len()
    }
}
