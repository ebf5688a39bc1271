//! `lilja_assets`
//!
//! Asset lifetime management shared by every loader backend.
//!
//! Design goals:
//! - Every loaded asset is owned by exactly one claim (`AssetHandle`).
//! - Claims are grouped into scopes (`AssetLifetime`) and released together.
//! - Reference counts are explicit services, never hidden globals.
//! - Loader backends are interchangeable behind the `AssetLoader` trait.
//! - No `unsafe`.

pub mod asset;
pub mod config;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod lifetime;
pub mod loader;
pub mod ref_count;
pub mod store;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::asset::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::handle::*;
    pub use crate::lifetime::*;
    pub use crate::loader::*;
    pub use crate::ref_count::*;
}
