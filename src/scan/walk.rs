use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Every directory below `root` (including `root` itself), depth first and
/// in sorted order. Subtrees under `skip` are left out, which keeps a cache
/// that lives inside the repository from being scanned.
///
/// Symlinked directories below `root` are not followed. A missing root
/// yields nothing. An unreadable subdirectory is logged and its siblings
/// are still visited.
pub fn package_dirs<R: Runtime + ?Sized>(
    runtime: &R,
    root: &Path,
    skip: Option<&Path>,
) -> Vec<PathBuf> {
    if !runtime.is_dir(root) {
        warn!("{:?}: no such directory", root);
        return Vec::new();
    }

    let mut dirs = Vec::new();
    visit(runtime, root, skip, &mut dirs);
    dirs
}

fn visit<R: Runtime + ?Sized>(runtime: &R, dir: &Path, skip: Option<&Path>, out: &mut Vec<PathBuf>) {
    if skip.is_some_and(|s| dir.starts_with(s)) {
        debug!("skipping {:?}", dir);
        return;
    }
    out.push(dir.to_path_buf());

    let entries = match runtime.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("walking {:?}: {:#}", dir, e);
            return;
        }
    };

    for entry in entries {
        if runtime.is_symlink(&entry) {
            debug!("not following symlink {:?}", entry);
            continue;
        }
        if runtime.is_dir(&entry) {
            visit(runtime, &entry, skip, out);
        }
    }
}
