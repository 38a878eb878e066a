//! Directory scanning
//!
//! A [`PackageScanner`] indexes the `.ipk` files of one directory. Archives
//! with a fresh cache entry are served from the [`ControlCache`] on the
//! calling task; everything else is extracted on a [`WorkerPool`] slot.
//! Walking a whole tree is left to callers, see [`package_dirs`].

mod cache;
mod publish;
mod walk;

pub use cache::ControlCache;
pub use publish::{PublishReport, publish_root, write_index_files};
pub use walk::package_dirs;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::config::ScanConfig;
use crate::package::{PackageIndex, PackageRecord};
use crate::runtime::{FileStat, Runtime};
use crate::worker::WorkerPool;

pub const PACKAGE_EXTENSION: &str = "ipk";

/// How many records a scan produced, split by where they came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub scanned: usize,
    pub cached: usize,
}

impl ScanStats {
    pub fn total(&self) -> usize {
        self.scanned + self.cached
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (fresh {} | {} from cache)",
            self.total(),
            self.scanned,
            self.cached
        )
    }
}

pub struct PackageScanner<R: Runtime + 'static> {
    runtime: Arc<R>,
    packages: Arc<PackageIndex>,
    cache: Option<ControlCache>,
    md5: bool,
    sha1: bool,
    // Bumped from worker threads
    scanned: Arc<AtomicUsize>,
    cached: usize,
}

impl<R: Runtime + 'static> PackageScanner<R> {
    /// A scanner filling a fresh index, with the digest settings of `config`
    /// and no cache.
    pub fn new(runtime: Arc<R>, config: &ScanConfig) -> Self {
        Self {
            runtime,
            packages: Arc::new(PackageIndex::new()),
            cache: None,
            md5: config.md5,
            sha1: config.sha1,
            scanned: Arc::new(AtomicUsize::new(0)),
            cached: 0,
        }
    }

    pub fn with_cache(mut self, cache: ControlCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Add records to `packages` instead of a fresh index. Several scanners
    /// can share one index this way.
    pub fn with_index(mut self, packages: Arc<PackageIndex>) -> Self {
        self.packages = packages;
        self
    }

    pub fn packages(&self) -> &Arc<PackageIndex> {
        &self.packages
    }

    pub fn into_packages(self) -> Arc<PackageIndex> {
        self.packages
    }

    /// Totals over every [`scan`](PackageScanner::scan) call so far.
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            scanned: self.scanned.load(Ordering::SeqCst),
            cached: self.cached,
        }
    }

    /// Index the packages directly inside `dir`, running at most `workers`
    /// extractions at once.
    ///
    /// Only failing to prepare the cache directory or to list `dir` is an
    /// error. Archives that cannot be read or parsed are logged and left
    /// out of the index.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&mut self, dir: &Path, workers: usize) -> Result<ScanStats> {
        let started = Instant::now();
        let before = self.stats();

        if let Some(cache) = &self.cache {
            cache.ensure(self.runtime.as_ref())?;
        }
        let entries = self
            .runtime
            .read_dir(dir)
            .with_context(|| format!("reading directory {:?}", dir))?;

        let mut pool = WorkerPool::new(workers);
        for path in entries {
            let Some(name) = package_name(&path) else {
                continue;
            };
            let stat = match self.runtime.metadata(&path) {
                Ok(stat) => stat,
                Err(e) => {
                    warn!("{:#}", e);
                    continue;
                }
            };
            if stat.is_dir {
                continue;
            }

            if self.serve_from_cache(&name, &path, stat) {
                continue;
            }

            let worker = pool.hire().await?;
            let job = ExtractJob {
                runtime: Arc::clone(&self.runtime),
                packages: Arc::clone(&self.packages),
                cache: self.cache.clone(),
                dir: dir.to_path_buf(),
                name,
                md5: self.md5,
                sha1: self.sha1,
                scanned: Arc::clone(&self.scanned),
            };
            pool.spawn(worker, move || job.run());
        }
        pool.wait().await;

        let after = self.stats();
        let stats = ScanStats {
            scanned: after.scanned - before.scanned,
            cached: after.cached - before.cached,
        };
        info!("{:?}: {} in {:?}", dir, stats, started.elapsed());
        Ok(stats)
    }

    /// Add `name` from its cache entry. Returns `false` when the archive
    /// still has to be extracted.
    fn serve_from_cache(&mut self, name: &str, path: &Path, stat: FileStat) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let Some(control_path) = cache.lookup(self.runtime.as_ref(), name, &stat) else {
            return false;
        };

        let record = match PackageRecord::from_cache(
            self.runtime.as_ref(),
            name,
            &control_path,
            path.to_path_buf(),
            stat,
        ) {
            Ok(record) => record,
            Err(e) => {
                warn!("{:#}, extracting instead", e);
                return false;
            }
        };

        match self.packages.add(name, record) {
            Ok(()) => self.cached += 1,
            Err(e) => error!("{}", e),
        }
        true
    }
}

/// The file name of `path` if it looks like a package archive.
fn package_name(path: &Path) -> Option<String> {
    if path.extension()? != PACKAGE_EXTENSION {
        return None;
    }
    path.file_name()?.to_str().map(str::to_string)
}

/// One cache miss, run on a worker slot.
struct ExtractJob<R: Runtime + 'static> {
    runtime: Arc<R>,
    packages: Arc<PackageIndex>,
    cache: Option<ControlCache>,
    dir: PathBuf,
    name: String,
    md5: bool,
    sha1: bool,
    scanned: Arc<AtomicUsize>,
}

impl<R: Runtime + 'static> ExtractJob<R> {
    fn run(self) {
        let started = Instant::now();
        let runtime = self.runtime.as_ref();

        let record = match PackageRecord::from_file(runtime, &self.name, &self.dir, self.md5, self.sha1) {
            Ok(record) => record,
            Err(e) => {
                error!("{:#}", e);
                return;
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(runtime, &self.name, &record.control) {
                warn!("caching control of {:?}: {:#}", self.name, e);
            }
        }

        match self.packages.add(self.name.as_str(), record) {
            Ok(()) => {
                self.scanned.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => error!("{}", e),
        }
        debug!("extracted {:?} in {:?}", self.name, started.elapsed());
    }
}
