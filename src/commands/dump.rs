use anyhow::Result;
use log::info;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ScanConfig;
use crate::package::ControlFields;
use crate::runtime::Runtime;
use crate::scan::{PackageScanner, package_dirs};

/// Scan every directory below `root` and print its index to `out`, either
/// in `Packages` format or as a JSON array of field maps.
///
/// Fails on the first directory that cannot be read.
#[tracing::instrument(skip(runtime, config, out))]
pub async fn dump<R: Runtime + 'static, W: Write>(
    runtime: Arc<R>,
    root: &Path,
    config: &ScanConfig,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let mut documents: Vec<ControlFields> = Vec::new();

    for dir in package_dirs(runtime.as_ref(), root, None) {
        let started = Instant::now();
        info!("start building index from {:?}", dir);

        let mut scanner = PackageScanner::new(Arc::clone(&runtime), config);
        scanner.scan(&dir, config.workers).await?;
        let packages = scanner.into_packages();
        packages.seal();
        info!(
            "time to parse {} packages: {:?}",
            packages.len(),
            started.elapsed()
        );

        if json {
            documents.extend(packages.records().iter().map(|r| r.enhanced_fields()));
        } else {
            packages.control_to(out)?;
        }
    }

    if json {
        serde_json::to_writer_pretty(&mut *out, &documents)?;
        writeln!(out)?;
    }
    out.flush()?;
    info!("done building index");
    Ok(())
}
