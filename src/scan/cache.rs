//! On-disk cache of extracted control files.
//!
//! Layout: `<cache-root>/<relative-dir>/<archive-name>.control`, holding the
//! raw control text. An entry is valid while its own modification time is
//! not older than the archive's.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runtime::{FileStat, Runtime};

const CONTROL_SUFFIX: &str = ".control";
const TEMP_SUFFIX: &str = ".tmp";

/// The cache directory belonging to one scanned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCache {
    dir: PathBuf,
}

impl ControlCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache for `dir`, a directory somewhere below `root`, mirrored
    /// under `cache_root`.
    pub fn for_directory(cache_root: &Path, root: &Path, dir: &Path) -> Self {
        let relative = pathdiff::diff_paths(dir, root).unwrap_or_default();
        Self::new(cache_root.join(relative))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, CONTROL_SUFFIX))
    }

    /// Create the cache directory if it does not exist yet.
    pub fn ensure<R: Runtime + ?Sized>(&self, runtime: &R) -> Result<()> {
        runtime
            .create_dir_all(&self.dir)
            .with_context(|| format!("creating cache-folder {:?}", self.dir))
    }

    /// The path of a valid entry for `name`, or `None` if there is no entry
    /// or it is older than the archive.
    pub fn lookup<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        name: &str,
        archive: &FileStat,
    ) -> Option<PathBuf> {
        let path = self.entry_path(name);
        let entry = runtime.metadata(&path).ok()?;
        (entry.modified >= archive.modified).then_some(path)
    }

    /// Write the control text for `name`. The text goes to a temporary file
    /// first and is renamed into place, so an interrupted write never leaves
    /// a truncated entry behind.
    pub fn store<R: Runtime + ?Sized>(&self, runtime: &R, name: &str, control: &str) -> Result<()> {
        let path = self.entry_path(name);
        let temp = self.dir.join(format!("{}{}{}", name, CONTROL_SUFFIX, TEMP_SUFFIX));

        runtime.write(&temp, control.as_bytes())?;
        if let Err(e) = runtime.rename(&temp, &path) {
            let _ = runtime.remove_file(&temp);
            return Err(e);
        }
        Ok(())
    }
}
