use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bundle::{BundleTarget, write_bundle};
use crate::condense::condense_packages;
use crate::config::ScanConfig;
use crate::runtime::Runtime;

/// Condense `roots` to the newest version of every package and bundle the
/// result into `target`. A listing target prints to `out`.
#[tracing::instrument(skip(runtime, config, out))]
pub async fn condense<R: Runtime + 'static, W: Write>(
    runtime: Arc<R>,
    roots: &[PathBuf],
    target: &BundleTarget,
    arch_subdirs: bool,
    config: &ScanConfig,
    out: &mut W,
) -> Result<()> {
    let report = condense_packages(Arc::clone(&runtime), roots, config).await?;
    write_bundle(runtime.as_ref(), &report.index, target, arch_subdirs, out)?;
    Ok(())
}
