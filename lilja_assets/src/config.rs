//! Loader configuration.
//!
//! Parsed from JSON strings/files; the CLI overrides individual fields.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Which loader backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderBackend {
    /// Pooled resources, counted per loaded instance.
    Pooled,
    /// Catalog-addressed assets, one release per load.
    Addressable,
}

impl std::str::FromStr for LoaderBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pooled" | "resources" => Ok(LoaderBackend::Pooled),
            "addressable" | "addressables" => Ok(LoaderBackend::Addressable),
            other => anyhow::bail!("unknown loader backend `{other}`"),
        }
    }
}

/// Root configuration for asset loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Backend used by `build_loader`.
    #[serde(default = "default_backend")]
    pub backend: LoaderBackend,
    /// Directory assets are resolved against.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Addressable catalog file, relative to `root`.
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    /// Extensions loaded as composite objects. Composite assets are never
    /// counted or unloaded by the pooled loader.
    #[serde(default = "default_composite_extensions")]
    pub composite_extensions: Vec<String>,
}

fn default_backend() -> LoaderBackend {
    LoaderBackend::Pooled
}

fn default_root() -> PathBuf {
    PathBuf::from("assets")
}

fn default_catalog() -> PathBuf {
    PathBuf::from("catalog.json")
}

fn default_composite_extensions() -> Vec<String> {
    vec!["prefab".to_string(), "scene".to_string()]
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            root: default_root(),
            catalog: default_catalog(),
            composite_extensions: default_composite_extensions(),
        }
    }
}

impl LoaderConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub async fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Full path of the addressable catalog.
    pub fn catalog_path(&self) -> PathBuf {
        self.root.join(&self.catalog)
    }

    /// Whether `path` has one of the composite extensions.
    pub fn is_composite(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.composite_extensions
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
