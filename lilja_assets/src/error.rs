//! Error types for loading and disposal.

use thiserror::Error;

/// Failure of `AssetLoader::load`.
///
/// A key that resolves to nothing is not an error; loaders return `Ok(None)`.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("asset key must not be empty")]
    InvalidKey,
    #[error("load of `{key}` was cancelled")]
    Cancelled { key: String },
    #[error("backend failed to load `{key}`")]
    Backend {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl LoadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoadError::Cancelled { .. })
    }
}

/// Failures collected while disposing a lifetime.
///
/// Disposal never stops at the first failing handle; every handle is
/// attempted and the failures are reported together.
#[derive(Debug, Error)]
#[error("{} handle(s) failed to dispose", .failures.len())]
pub struct DisposeError {
    pub failures: Vec<anyhow::Error>,
}
