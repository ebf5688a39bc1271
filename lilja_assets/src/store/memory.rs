//! In-memory stores.
//!
//! Both stores record every unload/release so callers can assert on exact
//! call counts. Loads can be held open with `hold(true)` to exercise
//! cancellation, and keys can be made to fail with `fail_key`.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::asset::{AssetId, AssetKind, AssetType, LoadedAsset};
use crate::loader::{AddressableStore, LoadToken, ResourceStore};

type Payload = Arc<dyn Any + Send + Sync>;
type Hook = Box<dyn Fn(&str) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Blocks loads while held.
struct Gate {
    held: watch::Sender<bool>,
}

impl Gate {
    fn new() -> Self {
        let (held, _) = watch::channel(false);
        Self { held }
    }

    fn set(&self, held: bool) {
        self.held.send_replace(held);
    }

    async fn pass(&self) {
        let mut rx = self.held.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|held| !*held).await;
    }
}

struct Entry {
    kind: AssetKind,
    payload: Payload,
    resident: Option<AssetId>,
}

/// Pooled store over a fixed set of payloads.
///
/// A key keeps its `AssetId` while resident; unloading it and loading it
/// again produces a new id.
pub struct MemoryResourceStore {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
    loads: AtomicU64,
    unloads: Mutex<Vec<AssetId>>,
    failing: Mutex<HashSet<String>>,
    failing_unloads: Mutex<HashSet<AssetId>>,
    after_load: Mutex<Option<Hook>>,
    gate: Gate,
}

impl Default for MemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            loads: AtomicU64::new(0),
            unloads: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            failing_unloads: Mutex::new(HashSet::new()),
            after_load: Mutex::new(None),
            gate: Gate::new(),
        }
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: &str, kind: AssetKind, value: T) {
        lock(&self.entries).insert(
            key.to_string(),
            Entry {
                kind,
                payload: Arc::new(value),
                resident: None,
            },
        );
    }

    /// Holds (or lets through) every pending and future load.
    pub fn hold(&self, held: bool) {
        self.gate.set(held);
    }

    /// Makes loads of `key` fail with a backend error.
    pub fn fail_key(&self, key: &str) {
        lock(&self.failing).insert(key.to_string());
    }

    /// Makes unloading `id` fail.
    pub fn fail_unload(&self, id: AssetId) {
        lock(&self.failing_unloads).insert(id);
    }

    /// Runs `hook` with the key after each successful load, before it
    /// returns to the loader.
    pub fn after_load(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *lock(&self.after_load) = Some(Box::new(hook));
    }

    /// Number of `load` calls that reached the store.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Unloads recorded for `id`, including failed attempts.
    pub fn unload_count(&self, id: AssetId) -> usize {
        lock(&self.unloads).iter().filter(|u| **u == id).count()
    }

    pub fn total_unloads(&self) -> usize {
        lock(&self.unloads).len()
    }

    /// Whether `key` is currently resident.
    pub fn key_is_resident(&self, key: &str) -> bool {
        lock(&self.entries)
            .get(key)
            .is_some_and(|entry| entry.resident.is_some())
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn load(&self, key: &str, _ty: AssetType) -> anyhow::Result<Option<LoadedAsset>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;

        if lock(&self.failing).contains(key) {
            anyhow::bail!("simulated failure loading `{key}`");
        }

        let asset = {
            let mut entries = lock(&self.entries);
            let Some(entry) = entries.get_mut(key) else {
                return Ok(None);
            };
            let id = *entry
                .resident
                .get_or_insert_with(|| AssetId(self.next_id.fetch_add(1, Ordering::SeqCst)));
            LoadedAsset::new(id, entry.kind, entry.payload.clone())
        };

        if let Some(hook) = lock(&self.after_load).as_ref() {
            hook(key);
        }
        Ok(Some(asset))
    }

    fn unload(&self, id: AssetId) -> anyhow::Result<()> {
        lock(&self.unloads).push(id);
        if lock(&self.failing_unloads).contains(&id) {
            anyhow::bail!("simulated failure unloading {id}");
        }

        let mut entries = lock(&self.entries);
        let entry = entries
            .values_mut()
            .find(|entry| entry.resident == Some(id))
            .ok_or_else(|| anyhow::anyhow!("asset {id} is not resident"))?;
        entry.resident = None;
        Ok(())
    }

    fn is_resident(&self, id: AssetId) -> bool {
        lock(&self.entries)
            .values()
            .any(|entry| entry.resident == Some(id))
    }
}

struct PendingLoad {
    key: String,
}

/// Addressable store over a fixed catalog of payloads.
pub struct MemoryAddressableStore {
    catalog: Mutex<HashMap<String, (AssetKind, Payload)>>,
    tokens: Mutex<HashMap<LoadToken, PendingLoad>>,
    next_token: AtomicU64,
    releases: Mutex<Vec<LoadToken>>,
    failing: Mutex<HashSet<String>>,
    gate: Gate,
}

impl Default for MemoryAddressableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAddressableStore {
    pub fn new() -> Self {
        Self {
            catalog: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            releases: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            gate: Gate::new(),
        }
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: &str, kind: AssetKind, value: T) {
        let payload: Payload = Arc::new(value);
        lock(&self.catalog).insert(key.to_string(), (kind, payload));
    }

    pub fn hold(&self, held: bool) {
        self.gate.set(held);
    }

    pub fn fail_key(&self, key: &str) {
        lock(&self.failing).insert(key.to_string());
    }

    /// Successful `release` calls.
    pub fn release_count(&self) -> usize {
        lock(&self.releases).len()
    }
}

#[async_trait]
impl AddressableStore for MemoryAddressableStore {
    fn begin_load(&self, key: &str, _ty: AssetType) -> anyhow::Result<LoadToken> {
        let token = LoadToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        lock(&self.tokens).insert(
            token,
            PendingLoad {
                key: key.to_string(),
            },
        );
        Ok(token)
    }

    async fn complete(&self, token: LoadToken) -> anyhow::Result<Option<LoadedAsset>> {
        self.gate.pass().await;

        let key = lock(&self.tokens)
            .get(&token)
            .map(|pending| pending.key.clone())
            .ok_or_else(|| anyhow::anyhow!("unknown load token {token:?}"))?;
        if lock(&self.failing).contains(&key) {
            anyhow::bail!("simulated failure loading `{key}`");
        }

        Ok(lock(&self.catalog)
            .get(&key)
            .map(|(kind, payload)| LoadedAsset::new(AssetId(token.0), *kind, payload.clone())))
    }

    fn is_valid(&self, token: LoadToken) -> bool {
        lock(&self.tokens).contains_key(&token)
    }

    fn release(&self, token: LoadToken) -> anyhow::Result<()> {
        if lock(&self.tokens).remove(&token).is_none() {
            anyhow::bail!("load token {token:?} released twice");
        }
        lock(&self.releases).push(token);
        Ok(())
    }

    fn live_tokens(&self) -> usize {
        lock(&self.tokens).len()
    }
}
