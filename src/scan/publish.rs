use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use log::{error, info};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::{ControlCache, PackageScanner, package_dirs};
use crate::config::ScanConfig;
use crate::package::PackageIndex;
use crate::runtime::Runtime;

pub const PACKAGES_FILE: &str = "Packages";
pub const PACKAGES_GZ_FILE: &str = "Packages.gz";
pub const STAMPS_FILE: &str = "Packages.stamps";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub directories: usize,
    pub packages: usize,
}

/// Scan every directory below `root` and publish its index files into the
/// matching directory under `cache_root`.
///
/// A directory that cannot be scanned, or whose index files cannot be
/// written, is logged and skipped; the walk goes on with the next one.
#[tracing::instrument(skip(runtime, config))]
pub async fn publish_root<R: Runtime + 'static>(
    runtime: Arc<R>,
    root: &Path,
    cache_root: &Path,
    config: &ScanConfig,
) -> Result<PublishReport> {
    let mut report = PublishReport::default();

    for dir in package_dirs(runtime.as_ref(), root, Some(cache_root)) {
        let cache = ControlCache::for_directory(cache_root, root, &dir);
        let mut scanner = PackageScanner::new(Arc::clone(&runtime), config).with_cache(cache.clone());

        if let Err(e) = scanner.scan(&dir, config.workers).await {
            error!("scanning {:?}: {:#}", dir, e);
            continue;
        }

        let packages = scanner.into_packages();
        packages.seal();
        if let Err(e) = write_index_files(runtime.as_ref(), &packages, cache.dir()) {
            error!("publishing index of {:?}: {:#}", dir, e);
            continue;
        }

        report.directories += 1;
        report.packages += packages.len();
    }

    info!(
        "published {} packages in {} directories of {:?}",
        report.packages, report.directories, root
    );
    Ok(report)
}

/// Write `Packages`, `Packages.gz` and `Packages.stamps` for `index` into
/// `dir`. Each file is written under a temporary name and renamed into
/// place.
pub fn write_index_files<R: Runtime + ?Sized>(runtime: &R, index: &PackageIndex, dir: &Path) -> Result<()> {
    let mut control = Vec::new();
    index.control_to(&mut control)?;

    let mut stamps = Vec::new();
    index.stamps_to(&mut stamps)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&control)?;
    let compressed = encoder.finish().context("compressing Packages")?;

    for (name, contents) in [
        (PACKAGES_FILE, &control),
        (PACKAGES_GZ_FILE, &compressed),
        (STAMPS_FILE, &stamps),
    ] {
        let target = dir.join(name);
        let temp = dir.join(format!("{}.tmp", name));
        runtime.write(&temp, contents)?;
        runtime
            .rename(&temp, &target)
            .with_context(|| format!("publishing {:?}", target))?;
    }
    Ok(())
}
