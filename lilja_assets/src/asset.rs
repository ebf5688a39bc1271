//! Asset identity and type-erased payloads.

use std::any::{Any, TypeId};
use std::sync::Arc;

/// Engine instance id of a loaded asset.
///
/// Stable for as long as the instance stays loaded; a reload after unload
/// may produce a different id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Broad category of a loaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// A leaf asset (texture, clip, text...). Can be unloaded individually.
    Leaf,
    /// A whole object graph (prefab, scene). Cannot be unloaded individually.
    Composite,
}

/// Runtime description of the type a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetType {
    pub id: TypeId,
    pub name: &'static str,
}

impl AssetType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

/// A loaded asset as handed out by stores and loaders.
#[derive(Clone)]
pub struct LoadedAsset {
    pub id: AssetId,
    pub kind: AssetKind,
    payload: Arc<dyn Any + Send + Sync>,
}

impl LoadedAsset {
    pub fn new(id: AssetId, kind: AssetKind, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self { id, kind, payload }
    }

    /// Whether the payload is of the requested type.
    pub fn is_type(&self, ty: AssetType) -> bool {
        Any::type_id(&*self.payload) == ty.id
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.payload.clone().downcast::<T>().ok()
    }

    pub fn payload(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.payload
    }
}

impl std::fmt::Debug for LoadedAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedAsset")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
