use anyhow::{Context, Result, bail};
use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::runtime::Runtime;
use crate::scan::publish_root;

/// Scan `root` recursively and publish `Packages`, `Packages.gz` and
/// `Packages.stamps` for every directory into the cache tree.
#[tracing::instrument(skip(runtime, config))]
pub async fn scan<R: Runtime + 'static>(runtime: Arc<R>, root: &Path, config: &ScanConfig) -> Result<()> {
    let Some(cache_root) = &config.cache_root else {
        bail!("scan publishes into the cache directory, set one with --cache");
    };
    let root = std::path::absolute(root).with_context(|| format!("resolving {:?}", root))?;
    let cache_root =
        std::path::absolute(cache_root).with_context(|| format!("resolving {:?}", cache_root))?;

    info!("start building index from {:?}", root);
    let report = publish_root(runtime, &root, &cache_root, config).await?;
    info!(
        "done building index: {} packages in {} directories",
        report.packages, report.directories
    );
    Ok(())
}
