//! Asset lifetime demo binary.
//!
//! Usage:
//!   cargo run -p lilja_demo -- [--config loader.json] [--root assets]
//!       [--backend pooled|addressable] [--text] [--timeout-ms 500] <key>...
//!
//! Every key is loaded twice, into two separate lifetimes. The first
//! lifetime is disposed, then the second, and the number of live claims is
//! reported after each step.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use lilja_assets::config::LoaderConfig;
use lilja_assets::lifetime::AssetLifetime;
use lilja_assets::loader::{build_loader, AssetLoader, AssetLoaderExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    root: Option<PathBuf>,
    backend: Option<String>,
    text: bool,
    timeout_ms: Option<u64>,
    keys: Vec<String>,
}

fn parse_args() -> Args {
    let mut out = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--root" if i + 1 < args.len() => {
                out.root = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--backend" if i + 1 < args.len() => {
                out.backend = Some(args[i + 1].clone());
                i += 2;
            }
            "--timeout-ms" if i + 1 < args.len() => {
                out.timeout_ms = args[i + 1].parse().ok();
                i += 2;
            }
            "--text" => {
                out.text = true;
                i += 1;
            }
            key => {
                out.keys.push(key.to_string());
                i += 1;
            }
        }
    }
    out
}

async fn load_config(args: &Args) -> anyhow::Result<LoaderConfig> {
    let mut cfg = match &args.config {
        Some(path) => LoaderConfig::from_file(path).await?,
        None => LoaderConfig::default(),
    };
    if let Some(root) = &args.root {
        cfg.root = root.clone();
    }
    if let Some(backend) = &args.backend {
        cfg.backend = backend.parse().context("parse --backend")?;
    }
    Ok(cfg)
}

/// Loads every key into `lifetime`, logging what came back.
async fn load_all(
    loader: &dyn AssetLoader,
    args: &Args,
    lifetime: &AssetLifetime,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    for key in &args.keys {
        let size = if args.text {
            loader
                .load_as::<String>(key, lifetime, cancel)
                .await?
                .map(|text| text.chars().count())
        } else {
            loader
                .load_as::<Bytes>(key, lifetime, cancel)
                .await?
                .map(|data| data.len())
        };
        match size {
            Some(size) => info!(key = %key, size, "Loaded"),
            None => warn!(key = %key, "Not found"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    if args.keys.is_empty() {
        anyhow::bail!("no asset keys given");
    }
    let cfg = load_config(&args).await?;
    info!(backend = ?cfg.backend, root = %cfg.root.display(), "Starting asset demo");

    let loader = build_loader(&cfg).await.context("create loader")?;

    let cancel = CancellationToken::new();
    if let Some(ms) = args.timeout_ms {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            cancel.cancel();
        });
    }

    let first = AssetLifetime::new();
    let second = AssetLifetime::new();
    load_all(loader.as_ref(), &args, &first, &cancel)
        .await
        .context("first load pass")?;
    info!(live_claims = loader.live_claims(), "First pass loaded");
    load_all(loader.as_ref(), &args, &second, &cancel)
        .await
        .context("second load pass")?;
    info!(live_claims = loader.live_claims(), "Second pass loaded");

    first.dispose().context("dispose first lifetime")?;
    info!(live_claims = loader.live_claims(), "First lifetime disposed");
    second.dispose().context("dispose second lifetime")?;
    info!(live_claims = loader.live_claims(), "Second lifetime disposed");

    Ok(())
}
