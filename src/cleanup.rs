use anyhow::{Context, Result};
use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

const PARTIAL_SUFFIX: &str = ".partial";

/// RAII guard for an output written under `<target>.partial`.
///
/// [`commit`](PartialFile::commit) renames the partial file onto the target.
/// Dropping the guard without committing removes the partial file.
pub struct PartialFile<'a, R: Runtime + ?Sized> {
    runtime: &'a R,
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl<'a, R: Runtime + ?Sized> PartialFile<'a, R> {
    pub fn new(runtime: &'a R, target: &Path) -> Self {
        let mut name = OsString::from(target.as_os_str());
        name.push(PARTIAL_SUFFIX);
        Self {
            runtime,
            partial: PathBuf::from(name),
            target: target.to_path_buf(),
            committed: false,
        }
    }

    /// Where the output is written until it is committed.
    pub fn path(&self) -> &Path {
        &self.partial
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Move the finished output into place.
    pub fn commit(mut self) -> Result<()> {
        self.runtime
            .rename(&self.partial, &self.target)
            .with_context(|| format!("moving {:?} into place", self.target))?;
        self.committed = true;
        Ok(())
    }
}

impl<R: Runtime + ?Sized> Drop for PartialFile<'_, R> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        debug!("Cleaning up: {:?}", self.partial);
        if self.runtime.exists(&self.partial) {
            let _ = self.runtime.remove_file(&self.partial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_partial_path() {
        let runtime = MockRuntime::new();
        let mut guard = PartialFile::new(&runtime, Path::new("/out/bundle.tar.gz"));
        assert_eq!(guard.path(), Path::new("/out/bundle.tar.gz.partial"));
        assert_eq!(guard.target(), Path::new("/out/bundle.tar.gz"));
        // Skip the drop cleanup, the mock has no expectations
        guard.committed = true;
    }

    #[test]
    fn test_commit_renames_into_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("bundle.zip");

        let guard = PartialFile::new(&RealRuntime, &target);
        fs::write(guard.path(), "data").unwrap();
        guard.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "data");
        assert!(!dir.path().join("bundle.zip.partial").exists());
    }

    #[test]
    fn test_drop_without_commit_removes_partial() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("bundle.zip");

        {
            let guard = PartialFile::new(&RealRuntime, &target);
            fs::write(guard.path(), "half").unwrap();
        }

        assert!(!dir.path().join("bundle.zip.partial").exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_failed_commit_still_cleans_up() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_rename()
            .returning(|_, _| Err(anyhow::anyhow!("cross-device link")));
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/out/b.tar.partial")))
            .returning(|_| true);
        runtime
            .expect_remove_file()
            .with(eq(PathBuf::from("/out/b.tar.partial")))
            .times(1)
            .returning(|_| Ok(()));

        let guard = PartialFile::new(&runtime, Path::new("/out/b.tar"));
        assert!(guard.commit().is_err());
    }
}
