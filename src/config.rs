use std::path::PathBuf;

use crate::worker::DEFAULT_WORKERS;

/// Settings shared by every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Upper bound on concurrently extracted archives.
    pub workers: usize,
    pub md5: bool,
    pub sha1: bool,
    /// Root of the control cache. `None` disables caching.
    pub cache_root: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            md5: true,
            sha1: false,
            cache_root: None,
        }
    }
}

impl ScanConfig {
    pub fn new(workers: usize, md5: bool, sha1: bool, cache_root: Option<PathBuf>) -> Self {
        Self {
            workers: workers.max(1),
            md5,
            sha1,
            cache_root,
        }
    }

    /// The same settings with digest computation switched off.
    pub fn without_digests(&self) -> Self {
        Self {
            md5: false,
            sha1: false,
            ..self.clone()
        }
    }
}
